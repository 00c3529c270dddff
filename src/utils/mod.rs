//! Utility functions for hamiltonian-nn

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Save object to JSON file, creating parent directories as needed
pub fn save_json<T: Serialize + ?Sized, P: AsRef<Path>>(obj: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, obj)?;
    writer.flush()?;
    Ok(())
}

/// Load object from JSON file
pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Timing utilities
pub mod timing {
    use std::time::Instant;

    /// Logs its lifetime at `info` level when dropped
    pub struct Timer {
        start: Instant,
        name: String,
    }

    impl Timer {
        /// Start new timer
        pub fn new(name: &str) -> Self {
            Timer {
                start: Instant::now(),
                name: name.to_string(),
            }
        }

        /// Elapsed seconds
        pub fn elapsed(&self) -> f64 {
            self.start.elapsed().as_secs_f64()
        }
    }

    impl Drop for Timer {
        fn drop(&mut self) {
            tracing::info!(timer = %self.name, seconds = self.elapsed(), "elapsed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HnnError;
    use std::collections::BTreeMap;

    #[test]
    fn test_json_round_trip() {
        let dir = std::env::temp_dir().join("hnn_utils_test");
        let path = dir.join("nested").join("values.json");

        let mut values = BTreeMap::new();
        values.insert("k".to_string(), vec![1.5, -2.0]);
        save_json(&values, &path).unwrap();
        let loaded: BTreeMap<String, Vec<f64>> = load_json(&path).unwrap();
        assert_eq!(loaded, values);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let result: Result<Vec<f64>> = load_json("/nonexistent/hnn/file.json");
        assert!(matches!(result, Err(HnnError::IoError(_))));
    }

    #[test]
    fn test_timer_elapsed() {
        let timer = timing::Timer::new("test");
        assert!(timer.elapsed() >= 0.0);
    }
}
