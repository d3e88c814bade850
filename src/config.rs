// Configuration loading and parsing (rumble.toml).

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::game::engine::ScoringRules;

/// Default sync hub port.
pub const DEFAULT_WS_PORT: u16 = 9617;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    Validation { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_port: u16,
    pub db_path: String,
    /// Where export files land.
    pub export_dir: PathBuf,
    /// Optional CSV roster to preload the entrant pool from on first run.
    pub pool_csv: Option<PathBuf>,
    pub scoring: ScoringRules,
}

// ---------------------------------------------------------------------------
// rumble.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for rumble.toml. Every section is optional;
/// omitted sections fall back to defaults so a missing config file behaves
/// the same as an empty one.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    websocket: WebsocketSection,
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    scoring: ScoringRules,
    #[serde(default)]
    pool: PoolSection,
    #[serde(default)]
    export: ExportSection,
}

#[derive(Debug, Deserialize)]
struct WebsocketSection {
    port: u16,
}

impl Default for WebsocketSection {
    fn default() -> Self {
        WebsocketSection {
            port: DEFAULT_WS_PORT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PoolSection {
    csv: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportSection {
    dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration from `rumble.toml` in the working directory. A missing
/// file is not an error: everything has a sensible default.
pub fn load_config() -> Result<Config, ConfigError> {
    load_from_path(Path::new("rumble.toml"))
}

/// Load configuration from an explicit path (missing file -> defaults).
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let file = match std::fs::read_to_string(path) {
        Ok(text) => parse_config_file(&text, path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigFile::default(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    assemble(file)
}

/// Parse config text. Split out so tests can exercise parsing and
/// validation without touching the filesystem.
fn parse_config_file(text: &str, path: &Path) -> Result<ConfigFile, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn assemble(file: ConfigFile) -> Result<Config, ConfigError> {
    if file.scoring.elimination_points < 0.0 {
        return Err(ConfigError::Validation {
            field: "scoring.elimination_points".into(),
            message: "must not be negative".into(),
        });
    }
    if file.scoring.survival_points < 0.0 {
        return Err(ConfigError::Validation {
            field: "scoring.survival_points".into(),
            message: "must not be negative".into(),
        });
    }

    Ok(Config {
        ws_port: file.websocket.port,
        db_path: file.database.path.unwrap_or_else(default_db_path),
        export_dir: file.export.dir.unwrap_or_else(|| PathBuf::from("exports")),
        pool_csv: file.pool.csv,
        scoring: file.scoring,
    })
}

/// Default database location: the platform data directory, falling back to
/// the working directory when none is available.
fn default_db_path() -> String {
    match ProjectDirs::from("", "", "rumble-tracker") {
        Some(dirs) => {
            let dir = dirs.data_dir();
            let _ = std::fs::create_dir_all(dir);
            dir.join("rumble.db").to_string_lossy().into_owned()
        }
        None => "rumble.db".to_string(),
    }
}
