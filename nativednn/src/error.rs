use thiserror::Error;

use crate::ops::LayerKind;

pub type Result<T> = std::result::Result<T, DnnError>;

#[derive(Debug, Error)]
pub enum DnnError {
    #[error("failed to read model: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model file: {0}")]
    Format(String),

    #[error("unsupported model major version {found}, expected {expected}")]
    UnsupportedVersion { found: i32, expected: i32 },

    #[error("model size mismatch: parsed {parsed} bytes, file has {file_size} bytes")]
    SizeMismatch { parsed: usize, file_size: usize },

    #[error("data length of operand \"{name}\" overflows")]
    LengthOverflow { name: String },

    #[error("no free inference request slot")]
    NoRequestSlot,

    #[error("async executor: {0}")]
    Executor(String),

    #[error("layer {index} ({kind}) failed: {source:#}")]
    Layer {
        index: usize,
        kind: LayerKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("frame processing failed: {0:#}")]
    FrameProc(#[source] anyhow::Error),

    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid options: {0}")]
    Config(#[from] serde_json::Error),
}

impl DnnError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        DnnError::Format(msg.into())
    }
}
