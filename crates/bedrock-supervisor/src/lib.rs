//! Lifecycle of Bedrock dedicated-server processes and the pipeline that
//! turns their output into roster updates and in-game commands.

pub mod config;
pub mod documents;
pub mod error;
pub mod events;
pub mod metadata;
pub mod provision;
pub mod reactor;
pub mod registry;
pub mod supervisor;
pub mod tailer;
pub mod world_process;

pub use config::{SupervisorConfig, format_error_chain};
pub use error::{Result, SupervisorError};
pub use events::{DomainEvent, parse_line};
pub use metadata::MetadataStore;
pub use supervisor::Supervisor;
