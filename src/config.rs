use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Run configuration consumed by [`crate::training::Trainer`], loadable from TOML.
///
/// Every field is required; there is no sensible default for a run's flag or
/// output directories.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrainerConfig {
    /// Identifies the run; namespaces checkpoint and log file names.
    pub flag: String,
    pub checkpoint_path: PathBuf,
    pub log_path: PathBuf,
    /// Device label, `"cpu"` or an accelerator name such as `"cuda"`.
    pub device: String,
    pub batch_size: usize,
    pub epochs: usize,
    pub seed: u64,
    pub device_ids: Vec<usize>,
}

impl TrainerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: TrainerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flag.is_empty() {
            return Err(ConfigError::Validation("flag must not be empty".into()));
        }
        if self
            .flag
            .chars()
            .any(|c| std::path::is_separator(c) || c == '\0')
        {
            return Err(ConfigError::Validation(
                "flag must not contain path separators".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation("batch_size must be > 0".into()));
        }
        if self.device.is_empty() {
            return Err(ConfigError::Validation("device must not be empty".into()));
        }
        if self.is_accelerated() && self.device_ids.is_empty() {
            return Err(ConfigError::Validation(format!(
                "device '{}' needs at least one entry in device_ids",
                self.device
            )));
        }
        Ok(())
    }

    /// Whether the configured device is anything other than the CPU.
    pub fn is_accelerated(&self) -> bool {
        !self.device.eq_ignore_ascii_case("cpu")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_config() -> TrainerConfig {
        TrainerConfig {
            flag: "mnist_vae".to_string(),
            checkpoint_path: PathBuf::from("checkpoints"),
            log_path: PathBuf::from("logs"),
            device: "cpu".to_string(),
            batch_size: 32,
            epochs: 10,
            seed: 42,
            device_ids: vec![],
        }
    }

    #[test]
    fn test_sample_config_is_valid() {
        sample_config().validate().expect("sample config should be valid");
    }

    #[test]
    fn test_validation_rejects_zero_batch_size() {
        let mut config = sample_config();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_flag() {
        let mut config = sample_config();
        config.flag.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_flag_with_separator() {
        let mut config = sample_config();
        config.flag = "../escape".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_accelerator_requires_device_ids() {
        let mut config = sample_config();
        config.device = "cuda".to_string();
        assert!(config.validate().is_err());
        config.device_ids = vec![0, 1];
        config.validate().expect("cuda with ids should be valid");
        assert!(config.is_accelerated());
    }

    #[test]
    fn test_zero_epochs_is_valid() {
        let mut config = sample_config();
        config.epochs = 0;
        config.validate().expect("a run with no epochs only restores state");
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let toml_str = r#"
flag = "run"
checkpoint_path = "ckpt"
log_path = "logs"
device = "cpu"
batch_size = 8
epochs = 3
"#;
        let parsed: Result<TrainerConfig, _> = toml::from_str(toml_str);
        assert!(parsed.is_err(), "seed and device_ids are required");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
flag = "gmm_latent"
checkpoint_path = "ckpt"
log_path = "logs"
device = "cpu"
batch_size = 16
epochs = 5
seed = 7
device_ids = []
"#
        )
        .unwrap();

        let config = TrainerConfig::load(&path).unwrap();
        assert_eq!(config.flag, "gmm_latent");
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.seed, 7);
        assert!(!config.is_accelerated());
    }

    #[test]
    fn test_load_missing_file() {
        let err = TrainerConfig::load(Path::new("nonexistent_run.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_toml_roundtrips() {
        let toml_str = toml::to_string_pretty(&sample_config()).unwrap();
        let config: TrainerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, sample_config());
    }
}
