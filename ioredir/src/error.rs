use std::io;

/// A fatal startup error, each variant mapped to the exit code documented
/// for the CLI. Nothing below connection scope is represented here —
/// per-connection failures never propagate past their own teardown.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("argument error: {0}")]
    Args(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("server resolution error: {0}")]
    ServerResolution(io::Error),

    #[error("pool init error: {0}")]
    PoolInit(String),

    #[error("listener setup error: {0}")]
    Listener(io::Error),
}

impl StartupError {
    /// The process exit code this error should produce, per the CLI's
    /// documented contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Args(_) | StartupError::Config(_) => 1,
            StartupError::ServerResolution(_) => 2,
            StartupError::PoolInit(_) => 3,
            StartupError::Listener(_) => 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("no server entries configured")]
    NoServers,

    #[error("more than {max} server entries configured")]
    TooManyServers { max: usize },

    #[error("server entry {index} is missing a secret")]
    MissingSecret { index: usize },
}
