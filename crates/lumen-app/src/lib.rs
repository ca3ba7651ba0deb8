//! The `lumen` binary's library surface: CLI, configuration, and the chat
//! panel that drives the core over the bridge.

pub mod cli;
pub mod config;
pub mod panel;

pub use cli::Cli;
pub use config::AppConfig;
pub use panel::{ChatPanel, NotSentReason, SendOutcome};
