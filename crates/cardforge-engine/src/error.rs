use cardforge_contracts::generation::{FailureKind, GenerationFailure};

/// Source bytes could not be decoded as an image at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("image could not be decoded: {reason}")]
pub struct NormalizationFailure {
    reason: String,
}

impl NormalizationFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type GenerationOutcome<T> = Result<T, GenerationError>;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("input error: {0}")]
    Input(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("Download failed: HTTP {status}")]
    DownloadStatus { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("staging error: {0}")]
    Staging(String),
}

impl GenerationError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::Input(_) => FailureKind::Input,
            GenerationError::Provider(_) => FailureKind::Provider,
            GenerationError::DownloadStatus { .. } | GenerationError::Transport(_) => {
                FailureKind::Transport
            }
            GenerationError::Staging(_) => FailureKind::Staging,
        }
    }

    pub fn into_failure(self) -> GenerationFailure {
        GenerationFailure::new(self.kind(), self.to_string())
    }
}

impl From<NormalizationFailure> for GenerationError {
    fn from(err: NormalizationFailure) -> Self {
        Self::Input(err.to_string())
    }
}
