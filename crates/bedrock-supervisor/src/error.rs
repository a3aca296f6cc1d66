use std::path::PathBuf;

pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("world {0} is already running")]
    AlreadyRunning(String),

    #[error("invalid world name {0:?}")]
    InvalidWorldName(String),

    #[error("failed to launch world {world}: {reason}")]
    LaunchFailed { world: String, reason: String },

    #[error("failed to write command to world {world}")]
    WriteFailed {
        world: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to kill world {world}")]
    KillFailed {
        world: String,
        #[source]
        source: std::io::Error,
    },

    #[error("document {} is unreadable or unwritable", path.display())]
    DocumentIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to provision world {world}: {reason}")]
    Provision { world: String, reason: String },
}

impl SupervisorError {
    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::NotFound(_) => "not_found",
            SupervisorError::AlreadyRunning(_) => "already_running",
            SupervisorError::InvalidWorldName(_) => "invalid_world_name",
            SupervisorError::LaunchFailed { .. } => "launch_failed",
            SupervisorError::WriteFailed { .. } => "write_failed",
            SupervisorError::KillFailed { .. } => "kill_failed",
            SupervisorError::DocumentIo { .. } => "document_io",
            SupervisorError::Provision { .. } => "provision_failed",
        }
    }
}
