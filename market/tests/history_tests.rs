use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use market::{HistoryBuffer, HistoryPushResult};
use pulse::Bar;

fn ts(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap() + Duration::minutes(minute)
}

fn bar(minute: i64, close: f64) -> Bar {
    Bar::new(ts(minute), close, close + 1.0, close - 1.0, close, 5.0)
}

fn timestamps(buffer: &HistoryBuffer) -> Vec<DateTime<Utc>> {
    buffer
        .snapshot_sequence()
        .into_iter()
        .map(|b| b.datetime)
        .collect()
}

#[test]
fn capacity_three_keeps_last_three() {
    let buffer = HistoryBuffer::new(3);
    assert_eq!(buffer.append_or_update(bar(1, 1.0)), HistoryPushResult::Appended);
    assert_eq!(buffer.append_or_update(bar(2, 2.0)), HistoryPushResult::Appended);
    assert_eq!(buffer.append_or_update(bar(3, 3.0)), HistoryPushResult::Appended);
    assert_eq!(
        buffer.append_or_update(bar(4, 4.0)),
        HistoryPushResult::AppendedEvicted
    );

    assert_eq!(timestamps(&buffer), vec![ts(2), ts(3), ts(4)]);
    assert_eq!(buffer.len(), 3);
}

#[test]
fn equal_timestamp_replaces_last() {
    let buffer = HistoryBuffer::new(10);
    buffer.append_or_update(bar(1, 1.0));
    buffer.append_or_update(bar(2, 2.0));

    assert_eq!(buffer.append_or_update(bar(2, 2.5)), HistoryPushResult::Replaced);
    assert_eq!(buffer.len(), 2);
    let contents = buffer.snapshot_sequence();
    assert_eq!(contents[0].close_price, 1.0);
    assert_eq!(contents[1].close_price, 2.5);
    assert_eq!(buffer.latest().map(|b| b.close_price), Some(2.5));
}

#[test]
fn older_timestamp_is_rejected_without_change() {
    let buffer = HistoryBuffer::new(10);
    buffer.append_or_update(bar(1, 1.0));
    buffer.append_or_update(bar(3, 3.0));
    let before = buffer.snapshot_sequence();

    assert_eq!(
        buffer.append_or_update(bar(2, 2.0)),
        HistoryPushResult::RejectedOutOfOrder
    );
    assert_eq!(buffer.snapshot_sequence(), before);
}

#[test]
fn invalid_bar_is_rejected() {
    let buffer = HistoryBuffer::new(10);
    let mut broken = bar(1, 1.0);
    broken.high_price = f64::INFINITY;
    assert_eq!(buffer.append_or_update(broken), HistoryPushResult::RejectedInvalid);
    assert!(buffer.is_empty());
    assert!(buffer.latest().is_none());
}

#[test]
fn zero_capacity_is_clamped_to_one() {
    let buffer = HistoryBuffer::new(0);
    assert_eq!(buffer.capacity(), 1);
    buffer.append_or_update(bar(1, 1.0));
    buffer.append_or_update(bar(2, 2.0));
    assert_eq!(timestamps(&buffer), vec![ts(2)]);
}

#[test]
fn tail_returns_chronological_suffix() {
    let buffer = HistoryBuffer::new(10);
    for minute in 0..6 {
        buffer.append_or_update(bar(minute, minute as f64));
    }
    let tail = buffer.tail(3).into_iter().map(|b| b.datetime).collect::<Vec<_>>();
    assert_eq!(tail, vec![ts(3), ts(4), ts(5)]);
    assert_eq!(buffer.tail(50).len(), 6);

    buffer.clear();
    assert!(buffer.tail(3).is_empty());
}

#[test]
fn arbitrary_sequences_keep_bound_and_order() {
    // deterministic pseudo-random walk of timestamps, with repeats and regressions
    let buffer = HistoryBuffer::new(7);
    let mut state = 17u64;
    let mut minute = 0i64;
    for _ in 0..500 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let step = (state >> 33) % 5;
        minute += step as i64 - 1;
        buffer.append_or_update(bar(minute, 1.0 + (state % 100) as f64));

        let stamps = timestamps(&buffer);
        assert!(stamps.len() <= 7);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn concurrent_writer_and_readers_see_consistent_copies() {
    let buffer = Arc::new(HistoryBuffer::new(50));
    let writer = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || {
            for minute in 0..2000 {
                buffer.append_or_update(bar(minute, minute as f64));
            }
        })
    };

    let readers = (0..3)
        .map(|_| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for _ in 0..500 {
                    let copy = buffer.snapshot_sequence();
                    assert!(copy.len() <= 50);
                    assert!(copy.windows(2).all(|w| w[0].datetime < w[1].datetime));
                }
            })
        })
        .collect::<Vec<_>>();

    writer.join().expect("writer thread");
    for reader in readers {
        reader.join().expect("reader thread");
    }
    assert_eq!(buffer.latest().map(|b| b.datetime), Some(ts(1999)));
    assert_eq!(buffer.len(), 50);
}
