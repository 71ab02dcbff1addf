//! Reading and writing reports. The encoding is chosen by file extension.

use crate::core::ClusterReport;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported report extension: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML report: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Encoding {
    Json,
    Yaml,
}

impl Encoding {
    fn of(path: &Path) -> Result<Self, Error> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

pub fn load(path: &Path) -> Result<ClusterReport, Error> {
    let encoding = Encoding::of(path)?;
    let data = fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let report = match encoding {
        Encoding::Json => serde_json::from_slice(&data)?,
        Encoding::Yaml => serde_yaml::from_slice(&data)?,
    };
    Ok(report)
}

/// Writes the report, creating parent directories and replacing any existing file.
pub fn save(report: &ClusterReport, path: &Path) -> Result<(), Error> {
    let data = match Encoding::of(path)? {
        Encoding::Json => {
            let mut data = serde_json::to_vec_pretty(report)?;
            data.push(b'\n');
            data
        }
        Encoding::Yaml => serde_yaml::to_string(report)?.into_bytes(),
    };

    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    fs::write(path, data).map_err(io_err)?;

    info!(path = %path.display(), "Saved report");
    Ok(())
}
