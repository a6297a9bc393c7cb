use std::fs;
use std::path::{Path, PathBuf};

use crate::checkpoint::record::Checkpoint;
use crate::error::CheckpointError;
use crate::logging::notice;

/// Reads and writes the `latest`/`best` checkpoint pair of one run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    flag: String,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, flag: impl Into<String>) -> Self {
        CheckpointStore {
            dir: dir.into(),
            flag: flag.into(),
        }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(format!("checkpoint_{}.json", self.flag))
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir.join(format!("model_best_{}.json", self.flag))
    }

    pub fn path(&self, is_best: bool) -> PathBuf {
        if is_best {
            self.best_path()
        } else {
            self.latest_path()
        }
    }

    /// Write `checkpoint` to the latest file; when `is_best`, duplicate that
    /// file to the best path. Returns the latest path.
    pub fn save(&self, checkpoint: &Checkpoint, is_best: bool) -> Result<PathBuf, CheckpointError> {
        let latest = self.latest_path();
        let bytes = serde_json::to_vec(checkpoint)?;
        write_atomic(&latest, |tmp| fs::write(tmp, &bytes))?;

        if is_best {
            let best = self.best_path();
            write_atomic(&best, |tmp| fs::copy(&latest, tmp).map(|_| ()))?;
        }
        Ok(latest)
    }

    /// Read the latest or best checkpoint. A missing file is not an error.
    pub fn load(&self, is_best: bool) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path(is_best);
        if !path.is_file() {
            notice(&format!("=> no checkpoint found at '{}'", path.display()));
            return Ok(None);
        }

        notice(&format!("=> loading checkpoint '{}'", path.display()));
        let bytes = fs::read(&path).map_err(|e| CheckpointError::Read {
            path: path.clone(),
            source: e,
        })?;
        let checkpoint = serde_json::from_slice(&bytes)
            .map_err(|e| CheckpointError::Parse { path, source: e })?;
        Ok(Some(checkpoint))
    }
}

/// Produce `path` through a sibling temporary file and a rename.
fn write_atomic<F>(path: &Path, write: F) -> Result<(), CheckpointError>
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let to_err = |e| CheckpointError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    write(&tmp).map_err(to_err)?;
    fs::rename(&tmp, path).map_err(to_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::record::{ComponentKind, RecordValue};
    use crate::state::{StateDict, StateValue};

    fn sample_checkpoint(epoch: usize) -> Checkpoint {
        let mut checkpoint = Checkpoint {
            epoch,
            ..Default::default()
        };
        checkpoint
            .records
            .insert("loss".to_string(), RecordValue::Number(0.25));
        let mut state = StateDict::new();
        state.insert("steps".to_string(), StateValue::Scalar(epoch as f64));
        checkpoint.insert_component(ComponentKind::Optimizer, "adam", state);
        checkpoint
    }

    #[test]
    fn test_file_names_follow_flag() {
        let store = CheckpointStore::new("ckpt", "vae_mnist");
        assert_eq!(store.latest_path(), Path::new("ckpt/checkpoint_vae_mnist.json"));
        assert_eq!(store.best_path(), Path::new("ckpt/model_best_vae_mnist.json"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "run");
        let path = store.save(&sample_checkpoint(3), false).unwrap();
        assert!(path.exists());
        assert!(!store.best_path().exists());

        let loaded = store.load(false).unwrap().expect("latest checkpoint");
        assert_eq!(loaded, sample_checkpoint(3));
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "run");
        assert!(store.load(false).unwrap().is_none());
        assert!(store.load(true).unwrap().is_none());
    }

    #[test]
    fn test_best_is_a_copy_of_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "run");
        store.save(&sample_checkpoint(1), true).unwrap();
        store.save(&sample_checkpoint(2), false).unwrap();

        let best = store.load(true).unwrap().unwrap();
        let latest = store.load(false).unwrap().unwrap();
        assert_eq!(best.epoch, 1);
        assert_eq!(latest.epoch, 2);

        store.save(&sample_checkpoint(3), true).unwrap();
        assert_eq!(
            fs::read(store.best_path()).unwrap(),
            fs::read(store.latest_path()).unwrap()
        );
    }

    #[test]
    fn test_no_temporary_files_remain() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "run");
        store.save(&sample_checkpoint(1), true).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
    }

    #[test]
    fn test_corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "run");
        fs::write(store.latest_path(), b"{ not json").unwrap();
        let err = store.load(false).unwrap_err();
        assert!(matches!(err, CheckpointError::Parse { .. }));
    }
}
