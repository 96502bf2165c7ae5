//! JSON persistence of fit configuration and outcomes.

use std::fs::File;
use std::io;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{from_reader, to_writer_pretty};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads a JSON-encoded type from a given file `path`.
pub fn read_json<D: DeserializeOwned>(path: impl AsRef<Path>) -> Result<D, FileError> {
    let file = File::open(path)?;
    Ok(from_reader(BufReader::new(file))?)
}

/// Writes `value` to `path` as pretty-printed JSON, replacing any existing file.
pub fn write_json<S: Serialize + ?Sized>(path: impl AsRef<Path>, value: &S) -> Result<(), FileError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub trait ReadJsonFile<D> {
    fn read_json_file(path: impl AsRef<Path>) -> Result<D, FileError>;
}

impl<D: DeserializeOwned> ReadJsonFile<D> for D {
    fn read_json_file(path: impl AsRef<Path>) -> Result<D, FileError> {
        read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::process;

    use super::*;
    use crate::options::FitOptions;
    use crate::session::SessionConfig;

    fn temp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(format!("refit-{}-{name}.json", process::id()))
    }

    #[test]
    fn write_then_read_options() {
        let path = temp_path("options");
        let options = FitOptions::fast().with_seed(42);
        write_json(&path, &options).unwrap();
        let loaded = FitOptions::read_json_file(&path).unwrap();
        assert_eq!(options, loaded);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn partial_config_takes_defaults() {
        let path = temp_path("partial");
        std::fs::write(&path, r#"{"fitter": "de", "options": {"steps": 25}}"#).unwrap();
        let config: SessionConfig = read_json(&path).unwrap();
        assert_eq!(crate::algorithm::FitterKind::De, config.fitter);
        assert_eq!(25, config.options.steps);
        assert_eq!(FitOptions::default().pop, config.options.pop);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unknown_field_is_rejected() {
        let path = temp_path("unknown");
        std::fs::write(&path, r#"{"stepz": 25}"#).unwrap();
        let result: Result<FitOptions, _> = read_json(&path);
        assert!(matches!(result, Err(FileError::Json(_))));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file() {
        let result: Result<FitOptions, _> = read_json(temp_path("does-not-exist"));
        assert!(matches!(result, Err(FileError::Io(_))));
    }
}
