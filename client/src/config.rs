//! Persisted client settings: display name and last-used server host.
//!
//! Each value lives in its own one-line text file inside a data directory.
//! A missing file means "use the default"; any other I/O failure is
//! reported.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};

pub const NAME_FILE: &str = "name.txt";
pub const HOST_FILE: &str = "host.txt";
pub const DEFAULT_NAME: &str = "player";
pub const DEFAULT_HOST: &str = "localhost";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub name: String,
    pub host: String,
    dir: PathBuf,
}

impl Settings {
    /// Reads both files from `dir`, falling back to defaults for missing
    /// or blank ones.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        let name = read_line(&dir.join(NAME_FILE))?.unwrap_or_else(|| DEFAULT_NAME.to_string());
        let host = read_line(&dir.join(HOST_FILE))?.unwrap_or_else(|| DEFAULT_HOST.to_string());

        debug!("Loaded settings from {}: name={} host={}", dir.display(), name, host);
        Ok(Settings { name, host, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), ConfigError> {
        write_line(&self.dir, NAME_FILE, name)?;
        self.name = name.to_string();
        info!("Name set to {}", name);
        Ok(())
    }

    pub fn set_host(&mut self, host: &str) -> Result<(), ConfigError> {
        write_line(&self.dir, HOST_FILE, host)?;
        self.host = host.to_string();
        info!("Host set to {}", host);
        Ok(())
    }
}

fn read_line(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_line(dir: &Path, file: &str, value: &str) -> Result<(), ConfigError> {
    let path = dir.join(file);
    fs::create_dir_all(dir)
        .and_then(|_| fs::write(&path, format!("{}\n", value)))
        .map_err(|source| ConfigError::Write { path, source })
}
