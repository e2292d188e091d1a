use thiserror::Error;

/// Transport-level failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Connect,
    Timeout,
    Tls,
    Other,
}

/// Non-success HTTP status classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Auth,
    RateLimit,
    Server,
    Other,
}

impl ProtocolKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ProtocolKind::Auth,
            429 => ProtocolKind::RateLimit,
            500..=599 => ProtocolKind::Server,
            _ => ProtocolKind::Other,
        }
    }
}

/// Every failure the synchronization engine can hand back to a caller.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("network error ({kind:?}): {message}")]
    Network { kind: NetworkKind, message: String },

    #[error("remote returned HTTP {status}")]
    Protocol { status: u16, kind: ProtocolKind },

    #[error("no results: {0}")]
    EmptyResult(String),

    #[error("malformed payload: {0}")]
    Conversion(String),

    #[error("local store error: {0}")]
    LocalStore(String),

    #[error("all {failed} units failed, last error: {last}")]
    Aggregate { failed: usize, last: Box<SyncError> },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SyncError {
    pub fn network(kind: NetworkKind, message: impl Into<String>) -> Self {
        SyncError::Network {
            kind,
            message: message.into(),
        }
    }

    pub fn protocol(status: u16) -> Self {
        SyncError::Protocol {
            status,
            kind: ProtocolKind::from_status(status),
        }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        SyncError::LocalStore(err.to_string())
    }

    /// Stable short identifier, suitable for matching in a UI layer.
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Network { .. } => "network",
            SyncError::Protocol { kind, .. } => match kind {
                ProtocolKind::Auth => "auth",
                ProtocolKind::RateLimit => "rate_limit",
                ProtocolKind::Server => "server",
                ProtocolKind::Other => "protocol",
            },
            SyncError::EmptyResult(_) => "empty",
            SyncError::Conversion(_) => "conversion",
            SyncError::LocalStore(_) => "local_store",
            SyncError::Aggregate { .. } => "aggregate",
            SyncError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Short human-readable summary.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Network { kind, .. } => match kind {
                NetworkKind::Connect => "No internet connection or DNS lookup failed".to_string(),
                NetworkKind::Timeout => "Timed out: the catalog server did not answer".to_string(),
                NetworkKind::Tls => "TLS error while connecting to the catalog server".to_string(),
                NetworkKind::Other => "Network failure while contacting the catalog".to_string(),
            },
            SyncError::Protocol { status, kind } => match (status, kind) {
                (401, _) => "API key is invalid or expired".to_string(),
                (403, _) => "Access denied, check the API key permissions".to_string(),
                (_, ProtocolKind::RateLimit) => "Request limit exceeded, try again later".to_string(),
                (_, ProtocolKind::Server) => format!("Catalog server error ({})", status),
                _ => format!("Catalog request failed ({})", status),
            },
            SyncError::EmptyResult(what) => format!("Nothing found: {}", what),
            SyncError::Conversion(_) => "Received data could not be read".to_string(),
            SyncError::LocalStore(_) => "Local game library is unavailable".to_string(),
            SyncError::Aggregate { last, .. } => {
                format!("Every request failed. Last failure: {}", last.user_message())
            }
            SyncError::InvalidRequest(msg) => msg.clone(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return SyncError::protocol(status.as_u16());
        }
        if err.is_decode() {
            return SyncError::Conversion(err.to_string());
        }
        let kind = if err.is_timeout() {
            NetworkKind::Timeout
        } else if is_tls_failure(&err) {
            NetworkKind::Tls
        } else if err.is_connect() {
            NetworkKind::Connect
        } else {
            NetworkKind::Other
        };
        SyncError::network(kind, err.to_string())
    }
}

fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(inner) = source {
        let text = inner.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        source = inner.source();
    }
    false
}
