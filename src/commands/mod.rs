//! CLI command implementations

pub mod devices;
pub mod info;
pub mod merge;
pub mod update;

/// Error type shared by the commands
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
