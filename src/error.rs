use std::path::PathBuf;

/// Errors that can occur while reading or writing checkpoint files.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to write checkpoint {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse checkpoint {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("checkpoint has no entry '{0}'")]
    MissingComponent(String),

    #[error("failed to restore '{key}': {source}")]
    Restore { key: String, source: StateError },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while exporting or restoring a state dictionary.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("missing key '{0}'")]
    MissingKey(String),

    #[error("unexpected keys: {0:?}")]
    UnexpectedKeys(Vec<String>),

    #[error("'{key}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("'{key}' holds a {found}, expected a {expected}")]
    KindMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("recorder error: {0}")]
    Recorder(String),

    #[error("malformed module record: {0}")]
    Record(#[from] serde_json::Error),
}

/// Precondition failures of the numeric helpers.
#[derive(Debug, thiserror::Error)]
pub enum NumericError {
    #[error("label {label} outside 0..{n_labels}")]
    LabelOutOfRange { label: i64, n_labels: usize },

    #[error("class {0} has no samples")]
    EmptyClass(usize),

    #[error("covariance of class {0} is not positive definite")]
    SingularCovariance(usize),

    #[error("covariance is not positive definite")]
    NotPositiveDefinite,

    #[error("expected shape {expected:?}, got {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("input received no gradient")]
    MissingGradient,

    #[error("no gaussians to sample from")]
    NoGaussians,

    #[error("failed to read tensor data: {0}")]
    TensorData(String),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// Errors surfaced by the trainer lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to open log file {path}: {source}")]
    LogSink {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{hook} hook failed at epoch {epoch}: {source}")]
    Hook {
        hook: &'static str,
        epoch: usize,
        source: anyhow::Error,
    },

    #[error("panicked at epoch {epoch}: {message}")]
    Panicked { epoch: usize, message: String },

    #[error("failed to export '{key}': {source}")]
    Export { key: String, source: StateError },

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_error_display() {
        let err = CheckpointError::MissingComponent("optim_adam".to_string());
        assert_eq!(err.to_string(), "checkpoint has no entry 'optim_adam'");
    }

    #[test]
    fn test_state_error_display() {
        let err = StateError::ShapeMismatch {
            key: "fc1.weight".to_string(),
            expected: vec![4, 2],
            found: vec![2, 4],
        };
        assert_eq!(
            err.to_string(),
            "'fc1.weight' has shape [2, 4], expected [4, 2]"
        );
    }

    #[test]
    fn test_numeric_error_display() {
        let err = NumericError::LabelOutOfRange {
            label: 3,
            n_labels: 3,
        };
        assert_eq!(err.to_string(), "label 3 outside 0..3");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("batch_size must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "config validation error: batch_size must be > 0"
        );
    }

    #[test]
    fn test_hook_error_display() {
        let err = TrainerError::Hook {
            hook: "train",
            epoch: 2,
            source: anyhow::anyhow!("loss diverged"),
        };
        assert_eq!(err.to_string(), "train hook failed at epoch 2: loss diverged");
    }
}
