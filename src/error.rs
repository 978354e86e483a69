use thiserror::Error;

/// Every failure the engine can report.
///
/// `Schema` is fatal for a load; the rest are scoped to a single access.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("schema error in [{section}] line {line}: {message}")]
    Schema {
        section: String,
        line: usize,
        message: String,
    },

    #[error("address error: {0}")]
    Address(String),

    #[error("value out of range: {0}")]
    Range(String),

    #[error("string at {addr:#06x} has no terminator before end of image")]
    Truncation { addr: u32 },

    #[error("encoded string of {len} bytes at {addr:#06x} would overrun {limit:#06x}")]
    Overflow { addr: u32, len: usize, limit: u32 },

    #[error("{record}.{field}: mirror copies disagree")]
    MirrorMismatch { record: String, field: String },

    #[error("{record}.{field}: table mirror disagrees at element {index}")]
    TableMirrorMismatch {
        record: String,
        field: String,
        index: usize,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Config(String),

    #[error("save refused: {0} consistency violation(s)")]
    SaveRefused(usize),
}

impl EngineError {
    /// Schema error not tied to a particular line (cross-record checks).
    pub fn schema(section: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Schema {
            section: section.into(),
            line: 0,
            message: message.into(),
        }
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, EngineError::Schema { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
