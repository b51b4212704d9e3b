use std::fmt;

use jobscout_core::is_session_terminated;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BrowserError {
    pub kind: BrowserErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserErrorKind {
    Navigation,
    Timeout,
    StaleElement,
    InvalidSelector,
    Script,
    Unsupported,
    Closed,
}

impl fmt::Display for BrowserErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserErrorKind::Navigation => write!(f, "navigation failed"),
            BrowserErrorKind::Timeout => write!(f, "timeout"),
            BrowserErrorKind::StaleElement => write!(f, "stale element"),
            BrowserErrorKind::InvalidSelector => write!(f, "invalid selector"),
            BrowserErrorKind::Script => write!(f, "script error"),
            BrowserErrorKind::Unsupported => write!(f, "unsupported operation"),
            BrowserErrorKind::Closed => write!(f, "browser closed"),
        }
    }
}

impl BrowserError {
    pub fn new(kind: BrowserErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(BrowserErrorKind::Closed, message)
    }

    pub fn is_session_terminated(&self) -> bool {
        self.kind == BrowserErrorKind::Closed || is_session_terminated(&self.message)
    }

    pub fn escalate(self) -> Result<Self, SessionTerminated> {
        if self.is_session_terminated() {
            Err(SessionTerminated(self.to_string()))
        } else {
            Ok(self)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("browser session terminated: {0}")]
pub struct SessionTerminated(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub redirect_count: usize,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Decode,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Decode => write!(f, "decode error"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

impl From<FetchError> for BrowserError {
    fn from(err: FetchError) -> Self {
        let kind = match err.kind {
            FailureKind::Timeout => BrowserErrorKind::Timeout,
            _ => BrowserErrorKind::Navigation,
        };
        BrowserError::new(kind, err.to_string())
    }
}
