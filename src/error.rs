//! Recoverable error types (spec.md §7). Fatal startup failures still bubble
//! up through `main`'s `Box<dyn std::error::Error>`, matching the teacher;
//! these enums are for errors a running window manager must absorb and log
//! rather than crash on.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("canvas too small to place window ({needed_w}x{needed_h} at virtual ({x},{y}))")]
    CanvasTooSmall {
        x: i64,
        y: i64,
        needed_w: u32,
        needed_h: u32,
    },

    #[error("cell too small ({w}x{h}, minimum is {min_w}x{min_h})")]
    CellTooSmall { w: u32, h: u32, min_w: u32, min_h: u32 },

    #[error("no focused node to operate on")]
    NoFocusedNode,

    #[error("workspace {0} does not exist")]
    UnknownWorkspace(u32),

    #[error("canvas expansion exceeded retry budget ({attempts} attempts)")]
    ExpansionExhausted { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid keybinding spec '{0}'")]
    InvalidKeybind(String),

    #[error("unknown modifier name '{0}'")]
    UnknownModifier(String),

    #[error("unknown key name '{0}'")]
    UnknownKeyName(String),
}

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("failed to load extension at {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("extension {name} missing required symbol '{symbol}'")]
    MissingSymbol { name: String, symbol: String },

    #[error("extension {name} ABI checksum mismatch (expected {expected:#x}, got {got:#x})")]
    ChecksumMismatch {
        name: String,
        expected: u64,
        got: u64,
    },

    #[error("extension {name} requires API {required_major}.x, host provides {host_major}.x")]
    VersionMismatch {
        name: String,
        required_major: u32,
        host_major: u32,
    },

    #[error("extension {name} declared no usable capabilities")]
    NoCapabilities { name: String },

    #[error("extension {name} failed to initialize (code {code})")]
    InitializationFailed { name: String, code: i32 },

    #[error("extension {name} unloaded because of repeated unhealthy ticks ({ticks})")]
    Unhealthy { name: String, ticks: u32 },
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("failed to bind control socket at {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("client connection limit reached ({limit})")]
    ConnectionLimitReached { limit: usize },

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
