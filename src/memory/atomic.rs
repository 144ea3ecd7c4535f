//! Atomic file writes for the memory bank's backing file

use crate::errors::{MeshError, MeshResult};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Atomic file writer that uses write-temp-rename pattern
pub struct AtomicFileWriter {
    target_path: PathBuf,
    temp_path: PathBuf,
}

impl AtomicFileWriter {
    /// Create a new atomic file writer for the target path
    pub fn new(target_path: &Path) -> MeshResult<Self> {
        let temp_path = Self::generate_temp_path(target_path)?;

        Ok(AtomicFileWriter {
            target_path: target_path.to_path_buf(),
            temp_path,
        })
    }

    /// Write content to the file atomically
    pub fn write_content(&self, content: &str) -> MeshResult<()> {
        if let Some(parent) = self.target_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.temp_path, content)?;
        fs::rename(&self.temp_path, &self.target_path)?;

        Ok(())
    }

    /// Write JSON data to the file atomically
    pub fn write_json<T: serde::Serialize>(&self, data: &T) -> MeshResult<()> {
        let content = serde_json::to_string_pretty(data)?;
        self.write_content(&content)
    }

    fn generate_temp_path(target: &Path) -> MeshResult<PathBuf> {
        let filename = target.file_name().ok_or_else(|| {
            MeshError::config(format!("Storage path has no file name: {}", target.display()))
        })?;

        let temp_name = format!("{}.tmp.{}", filename.to_string_lossy(), Uuid::new_v4());

        Ok(match target.parent() {
            Some(parent) => parent.join(temp_name),
            None => PathBuf::from(temp_name),
        })
    }
}

impl Drop for AtomicFileWriter {
    fn drop(&mut self) {
        // Leftover temp file means the rename never happened
        if self.temp_path.exists() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Read and deserialize a JSON file
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> MeshResult<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
