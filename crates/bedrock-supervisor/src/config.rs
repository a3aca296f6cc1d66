use std::path::{Path, PathBuf};

use crate::error::{Result, SupervisorError};

const DEFAULT_LOG_MAX_LINES: usize = 1000;
const DEFAULT_ROLE: &str = "bocil";

pub(crate) fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn log_max_lines() -> usize {
    env_usize("BEDROCK_LOG_MAX_LINES")
        .map(|v| v.clamp(100, 50_000))
        .unwrap_or(DEFAULT_LOG_MAX_LINES)
}

/// Where worlds live on disk and how their worker is launched.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub data_root: PathBuf,
    pub server_binary: PathBuf,
    pub template_dir: PathBuf,
    pub log_max_lines: usize,
    /// Role used when the roster has no entry for a player.
    pub default_role: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./data"),
            server_binary: PathBuf::from("./bedrock_server"),
            template_dir: PathBuf::from("config/world_template"),
            log_max_lines: DEFAULT_LOG_MAX_LINES,
            default_role: DEFAULT_ROLE.to_string(),
        }
    }
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_root: env_string("BEDROCK_DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_root),
            server_binary: env_string("BEDROCK_SERVER_BINARY")
                .map(PathBuf::from)
                .unwrap_or(defaults.server_binary),
            template_dir: env_string("BEDROCK_TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_dir),
            log_max_lines: log_max_lines(),
            default_role: env_string("BEDROCK_DEFAULT_ROLE").unwrap_or(defaults.default_role),
        }
    }

    pub fn servers_dir(&self) -> PathBuf {
        self.data_root.join("servers")
    }

    /// Directory of a world. Fails before touching the filesystem if the name
    /// could escape `servers/`.
    pub fn world_dir(&self, name: &str) -> Result<PathBuf> {
        validate_world_name(name)?;
        Ok(self.servers_dir().join(name))
    }

    /// The worker executable for a world directory.
    ///
    /// Absolute paths are used as-is, relative paths with a separator
    /// (`./bedrock_server`) resolve inside the world directory, and bare names
    /// are left to `PATH`.
    pub fn server_binary_for(&self, world_dir: &Path) -> PathBuf {
        let bin = &self.server_binary;
        if bin.is_absolute() || (bin.components().count() == 1 && !bin.starts_with(".")) {
            return bin.clone();
        }
        world_dir.join(bin)
    }
}

pub fn validate_world_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(SupervisorError::InvalidWorldName(name.to_string()))
    }
}

pub fn format_error_chain(err: &anyhow::Error) -> String {
    let mut parts = Vec::<String>::new();
    for cause in err.chain() {
        let s = cause.to_string();
        if s.is_empty() || parts.last() == Some(&s) {
            continue;
        }
        parts.push(s);
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(": ")
    }
}
