#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    NotConnected,
    ConnectionFailed(String),
    AdapterError(String),
    HistoryUnavailable(String),
    Stopped,
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerError::NotConnected => write!(f, "broker adapter not connected"),
            BrokerError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            BrokerError::AdapterError(msg) => write!(f, "adapter error: {}", msg),
            BrokerError::HistoryUnavailable(msg) => write!(f, "history unavailable: {}", msg),
            BrokerError::Stopped => write!(f, "ingress stopping"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<pulse::DataError> for BrokerError {
    fn from(value: pulse::DataError) -> Self {
        BrokerError::HistoryUnavailable(value.to_string())
    }
}
