//! Settings resolution.
//!
//! Precedence is command-line flag, then environment variable (handled by
//! clap for `WBS_DIR` and `WBS_FILE`), then `config.json` in the data
//! directory, then built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::project::{most_recent_project, Project};
use crate::scheduler::{DependencyOrder, Scheduler};

pub const CONFIG_FILE: &str = "config.json";
const DEFAULT_PROJECT: &str = "Default";

/// Contents of `config.json`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub dependency_order: Option<DependencyOrder>,
    pub auto_schedule: Option<bool>,
    pub default_project: Option<String>,
}

impl FileConfig {
    /// Read `config.json` from `dir`; a missing file means all defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let buf = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        serde_json::from_str(&buf).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    /// Explicit project file, bypassing discovery.
    pub file: Option<PathBuf>,
    pub dependency_order: DependencyOrder,
    /// Reschedule after every command that edits tasks.
    pub auto_schedule: bool,
    pub default_project: String,
}

impl Settings {
    pub fn resolve(dir: Option<PathBuf>, file: Option<PathBuf>, order: Option<DependencyOrder>) -> Result<Self> {
        let data_dir = match dir {
            Some(d) => d,
            None => default_data_dir(),
        };
        let file_config = FileConfig::load(&data_dir)?;
        let settings = Settings {
            file,
            dependency_order: order.or(file_config.dependency_order).unwrap_or_default(),
            auto_schedule: file_config.auto_schedule.unwrap_or(true),
            default_project: file_config
                .default_project
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            data_dir,
        };
        debug!(?settings, "resolved settings");
        Ok(settings)
    }

    pub fn ensure_data_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| Error::io(&self.data_dir, e))
    }

    /// The project commands operate on: `--file`, else the most recently
    /// modified project, else the default project (created on first use).
    pub fn select_project(&self) -> Result<Project> {
        if let Some(file) = &self.file {
            return Ok(Project::from_path(file.clone()));
        }
        if let Some(project) = most_recent_project(&self.data_dir)? {
            return Ok(project);
        }
        self.ensure_data_dir()?;
        let project = Project::new(&self.default_project, &self.data_dir);
        project.create_if_not_exists()?;
        info!(path = %project.file_path.display(), "created default project");
        Ok(project)
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new().with_order(self.dependency_order)
    }
}

/// `$HOME/.wbs`, or `./.wbs` when `HOME` is unset.
pub fn default_data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".wbs")
}
