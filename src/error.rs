use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Problems with the configuration file. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Section [{section}] is defined twice (line {line})")]
    DuplicateSection { section: String, line: usize },

    #[error("Key '{key}' is defined twice in section [{section}] (line {line})")]
    DuplicateKey {
        section: String,
        key: String,
        line: usize,
    },

    #[error("Section [{section}] is missing the required key '{key}'")]
    MissingKey { section: String, key: String },

    #[error("Unknown key '{key}' in section [{section}] (line {line})")]
    UnknownKey {
        section: String,
        key: String,
        line: usize,
    },

    #[error("Invalid value for '{key}' in section [{section}]: {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },

    #[error("'{key}' refers to profile '{id}', which is not defined")]
    UnknownProfile { key: String, id: String },

    #[error("No profile is defined in the configuration")]
    NoProfiles,

    #[error("Could not determine the configuration directory")]
    NoConfigPath,

    #[error("Configuration file {0:?} already exists")]
    AlreadyExists(PathBuf),

    #[error("Cannot write configuration file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The display query failed. Callers degrade to "no ports connected".
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{tool} did not answer in time")]
    TimedOut { tool: String },

    #[error("Cannot parse {tool} output: {reason}")]
    Unparseable { tool: String, reason: String },
}

/// A single profile command line failed.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {output}")]
    Failed {
        command: String,
        status: ExitStatus,
        output: String,
    },

    #[error("`{command}` timed out after {}s", .after.as_secs_f32())]
    TimedOut { command: String, after: Duration },
}

impl CommandError {
    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::Failed { command, .. }
            | Self::TimedOut { command, .. } => command,
        }
    }
}
