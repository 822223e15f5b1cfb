use thiserror::Error;

/// Reasons an audio device could not be opened or kept open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Unavailable,
    InvalidFormat,
    Busy,
}

impl std::fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unavailable => "unavailable",
            Self::InvalidFormat => "invalid format",
            Self::Busy => "busy",
        };
        f.write_str(s)
    }
}

/// Reasons a ControlPlane command was rejected without mutating state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorKind {
    UnknownLanguage,
    EmptySelection,
    InvalidThreshold,
}

impl std::fmt::Display for CommandErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnknownLanguage => "unknown language",
            Self::EmptySelection => "empty selection",
            Self::InvalidThreshold => "invalid threshold",
        };
        f.write_str(s)
    }
}

/// All errors produced by captioner-core.
#[derive(Debug, Error)]
pub enum CaptionerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("model load error for language {lang}: {reason}")]
    ModelLoad { lang: String, reason: String },

    #[error("audio device error: {kind}: {detail}")]
    Device {
        kind: DeviceErrorKind,
        detail: String,
    },

    #[error("recognizer error: {0}")]
    Recognizer(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("command rejected: {0}")]
    Command(CommandErrorKind),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CaptionerError>;
