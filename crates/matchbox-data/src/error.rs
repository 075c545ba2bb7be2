use std::path::PathBuf;

/// All errors that can occur while preparing semi-supervised datasets.
///
/// Covers dataset file loading, split construction, configuration and batch
/// collation. A single error type keeps propagation with `?` uniform across
/// the crate.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Underlying I/O failure while reading dataset files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file could not be parsed.
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// A required dataset file does not exist.
    #[error("dataset file not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// A binary dataset file is not a whole number of records.
    #[error("truncated dataset file {}: {len} bytes is not a multiple of the {record_size}-byte record", path.display())]
    Truncated {
        path: PathBuf,
        len: usize,
        record_size: usize,
    },

    /// A label read from disk (or supplied by the caller) exceeds the class count.
    #[error("label {label} out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },

    /// Dataset name not recognised.
    #[error("unknown dataset {0:?}, expected one of \"cifar10\", \"cifar100\"")]
    UnknownDataset(String),

    /// Augmentation mode name not recognised.
    #[error("unknown augmentation mode {0:?}, expected one of \"test\", \"casual\", \"fixmatch\", \"comatch\"")]
    UnknownMode(String),

    /// The mode is valid but not allowed in this position (e.g. `test` for
    /// the unlabeled training set).
    #[error("augmentation mode {mode} cannot be used for {context}")]
    InvalidMode { mode: String, context: &'static str },

    /// A class has fewer samples than the per-class label budget.
    #[error("class {class} has {available} samples, cannot draw {requested} without replacement")]
    InsufficientSamples {
        class: usize,
        available: usize,
        requested: usize,
    },

    /// The label budget cannot be spread evenly over the classes.
    #[error("label budget {num_labeled} cannot be split evenly across {num_classes} classes")]
    LabelBudget {
        num_labeled: usize,
        num_classes: usize,
    },

    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Samples collated into one batch disagree on their shape.
    #[error("shape mismatch in batch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Loaders were requested before `prepare_data` ran.
    #[error("data module not prepared, call prepare_data() first")]
    NotPrepared,

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl DataError {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        DataError::Msg(s.into())
    }
}

/// Convenience Result type used throughout matchbox-data.
pub type Result<T> = std::result::Result<T, DataError>;

/// Early return with a formatted [`DataError::InvalidConfig`].
/// Usage: `bail_config!("batch_size must be > 0, got {}", bs)`
#[macro_export]
macro_rules! bail_config {
    ($($arg:tt)*) => {
        return Err($crate::DataError::InvalidConfig(format!($($arg)*)))
    };
}
