//! Stable channel names for the UI/host boundary.
//!
//! These strings are a contract shared with the host process; renaming one
//! is a breaking change. Request/response channels are served by `invoke`,
//! push channels by `subscribe`.

// Request/response channels
pub const COMPLETION_REQUEST: &str = "completion:request";
pub const COMPLETION_CANCEL: &str = "completion:cancel";
pub const MODELS_LIST: &str = "models:list";
pub const FS_READ: &str = "fs:read";
pub const FS_WRITE: &str = "fs:write";
pub const FS_LIST: &str = "fs:list";
pub const FS_MKDIR: &str = "fs:mkdir";
pub const FS_DELETE: &str = "fs:delete";
pub const FS_RENAME: &str = "fs:rename";
pub const GIT_STATUS: &str = "git:status";
pub const GIT_COMMIT: &str = "git:commit";
pub const GIT_PUSH: &str = "git:push";
pub const GIT_PULL: &str = "git:pull";
pub const GIT_LOG: &str = "git:log";
pub const GIT_DIFF: &str = "git:diff";
pub const TERMINAL_SPAWN: &str = "terminal:spawn";
pub const TERMINAL_WRITE: &str = "terminal:write";
pub const TERMINAL_RESIZE: &str = "terminal:resize";
pub const TERMINAL_KILL: &str = "terminal:kill";
pub const CLIPBOARD_READ: &str = "clipboard:read";
pub const CLIPBOARD_WRITE: &str = "clipboard:write";
pub const SHELL_OPEN_EXTERNAL: &str = "shell:open-external";

// Push channels. Payloads carry enough identity (request id, terminal id)
// for the receiver to route them without ambiguity.
pub const STREAM_CHUNK: &str = "stream:chunk";
pub const STREAM_DONE: &str = "stream:done";
pub const STREAM_ERROR: &str = "stream:error";
pub const FS_CHANGED: &str = "fs:changed";
pub const TERMINAL_OUTPUT: &str = "terminal:output";

/// Channels whose name denotes a streaming operation get diagnostic
/// payload-shape tracing on the bridge.
pub fn is_stream_channel(channel: &str) -> bool {
    channel.starts_with("stream:")
}
