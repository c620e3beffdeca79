//! Persisted map-calibration store.
//!
//! One TOML file per map under the config directory. Loaded at startup,
//! saved after every calibration mutation. A file that fails to load is
//! logged and skipped; that map is simply uncalibrated for the session;
//! it must never take the process down.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::MapConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("serialize error for {path:?}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
}

/// Default store location: `<config_dir>/tacmap/maps`.
pub fn default_maps_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tacmap").join("maps"))
}

/// Load every map file in a directory.
///
/// A missing directory yields an empty set (first run). Individual files
/// that fail to read or parse are logged and skipped.
pub fn load_maps(dir: &Path) -> Result<Vec<MapConfig>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|e| StoreError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut maps = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "toml") {
            continue;
        }
        match load_file(&path) {
            Ok(config) => maps.push(config),
            Err(err) => {
                tracing::warn!(%err, "skipping unreadable map config");
            }
        }
    }

    Ok(maps)
}

/// Load a single map config file.
pub fn load_file(path: &Path) -> Result<MapConfig, StoreError> {
    let contents = fs::read_to_string(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write a map config to `<dir>/<map_id>.toml`, creating the directory as
/// needed.
pub fn save_map(dir: &Path, config: &MapConfig) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(dir).map_err(|e| StoreError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let path = dir.join(format!("{}.toml", sanitize_file_stem(&config.map_id)));
    let contents = toml::to_string_pretty(config).map_err(|e| StoreError::Serialize {
        path: path.clone(),
        source: e,
    })?;

    fs::write(&path, contents).map_err(|e| StoreError::Io {
        path: path.clone(),
        source: e,
    })?;

    Ok(path)
}

/// Map ids come from log lines; keep only characters safe in a filename.
fn sanitize_file_stem(map_id: &str) -> String {
    map_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
