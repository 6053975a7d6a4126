//! Error type for everything around the scheduling engine.
//!
//! The engine itself never fails: bad dates, durations and predecessor ids
//! degrade to defaults. Errors only come from the file store, the project
//! directory, configuration and command arguments.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid project file format in {} (expected a task array or an object with `tasks`)", path.display())]
    InvalidProjectFile { path: PathBuf },

    #[error("task {0} not found")]
    TaskNotFound(u64),

    #[error("task name cannot be empty")]
    EmptyTaskName,

    #[error("task {task} cannot be placed under {parent}: it would become its own ancestor")]
    ParentCycle { task: u64, parent: u64 },

    #[error("invalid date '{0}' (expected DD/MM/YYYY, YYYY-MM-DD, today or tomorrow)")]
    InvalidDate(String),

    #[error("project '{0}' already exists")]
    ProjectExists(String),

    #[error("project name cannot be empty")]
    EmptyProjectName,

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
