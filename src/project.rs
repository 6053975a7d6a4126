//! Project discovery and the open-project session.
//!
//! Projects are stored as individual JSON files in the data directory with
//! the naming convention `<project_name>_schedule.json`. A
//! [`ProjectSession`] pairs one project with its loaded tasks and is passed
//! explicitly to every command; there is no process-wide current project.
//!
//! Next to each project file sits `<project_name>_schedule.meta.json`, which
//! keeps what the bare task array cannot: the name the user typed and the
//! highest task id ever assigned.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::scheduler::{ScheduleReport, Scheduler};
use crate::store::TaskStore;

const FILE_SUFFIX: &str = "_schedule";
const META_EXTENSION: &str = "meta.json";

/// Per-project data kept beside the task array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMeta {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub last_id: u64,
}

/// Represents a project with its name and file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub display_name: String,
    pub file_path: PathBuf,
}

impl Project {
    /// Create a new project with the given display name.
    pub fn new(display_name: &str, dir: &Path) -> Self {
        let name = sanitize_project_name(display_name);
        let file_path = dir.join(format!("{name}{FILE_SUFFIX}.json"));
        Project {
            name,
            display_name: display_name.to_string(),
            file_path,
        }
    }

    /// Recognise a project file by its `_schedule.json` suffix.
    pub fn from_file(file_path: PathBuf) -> Option<Self> {
        if file_path.extension()?.to_str()? != "json" {
            return None;
        }
        let stem = file_path.file_stem()?.to_str()?;
        let name = stem.strip_suffix(FILE_SUFFIX)?;
        if name.is_empty() {
            return None;
        }
        Some(Project {
            name: name.to_string(),
            display_name: name.replace('_', " "),
            file_path,
        })
    }

    /// Any file passed explicitly with `--file`, named after its stem when it
    /// does not follow the project naming convention.
    pub fn from_path(file_path: PathBuf) -> Self {
        if let Some(project) = Project::from_file(file_path.clone()) {
            return project.with_saved_name();
        }
        let name = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("project")
            .to_string();
        Project {
            display_name: name.clone(),
            name,
            file_path,
        }
        .with_saved_name()
    }

    /// Create the project file (empty task list) if it doesn't exist.
    pub fn create_if_not_exists(&self) -> Result<()> {
        if !self.file_path.exists() {
            TaskStore::default().save(&self.file_path)?;
            self.save_meta(0)?;
        }
        Ok(())
    }

    pub fn meta_path(&self) -> PathBuf {
        self.file_path.with_extension(META_EXTENSION)
    }

    /// Read the sidecar; a missing or unreadable one yields defaults.
    pub fn load_meta(&self) -> ProjectMeta {
        let path = self.meta_path();
        let Ok(buf) = fs::read_to_string(&path) else {
            return ProjectMeta::default();
        };
        serde_json::from_str(&buf).unwrap_or_else(|e| {
            warn!(path = %path.display(), "ignoring unreadable project metadata: {e}");
            ProjectMeta::default()
        })
    }

    pub fn save_meta(&self, last_id: u64) -> Result<()> {
        let path = self.meta_path();
        let meta = ProjectMeta {
            display_name: Some(self.display_name.clone()),
            last_id,
        };
        let data = serde_json::to_string_pretty(&meta).map_err(|e| Error::json(&path, e))?;
        fs::write(&path, data).map_err(|e| Error::io(&path, e))
    }

    /// Take the display name recorded when the project was created.
    fn with_saved_name(mut self) -> Self {
        if let Some(name) = self.load_meta().display_name.filter(|n| !n.trim().is_empty()) {
            self.display_name = name;
        }
        self
    }
}

/// Convert a display name to a safe project name for file naming.
pub fn sanitize_project_name(display_name: &str) -> String {
    display_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Discover all existing projects in the data directory, sorted by name.
pub fn discover_projects(dir: &Path) -> Result<Vec<Project>> {
    let mut projects = Vec::new();
    if !dir.exists() {
        return Ok(projects);
    }

    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            if let Some(project) = Project::from_file(path) {
                projects.push(project.with_saved_name());
            }
        }
    }

    projects.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    Ok(projects)
}

/// Create a new, empty project.
pub fn create_project(display_name: &str, dir: &Path) -> Result<Project> {
    if sanitize_project_name(display_name).is_empty() {
        return Err(Error::EmptyProjectName);
    }

    let project = Project::new(display_name.trim(), dir);
    if project.file_path.exists() {
        return Err(Error::ProjectExists(display_name.trim().to_string()));
    }
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    project.create_if_not_exists()?;
    Ok(project)
}

/// Find the most recently modified project in the data directory.
pub fn most_recent_project(dir: &Path) -> Result<Option<Project>> {
    let mut most_recent: Option<(Project, SystemTime)> = None;

    for project in discover_projects(dir)? {
        let Ok(modified) = fs::metadata(&project.file_path).and_then(|m| m.modified()) else {
            continue;
        };
        match most_recent {
            Some((_, current)) if current >= modified => {}
            _ => most_recent = Some((project, modified)),
        }
    }

    Ok(most_recent.map(|(project, _)| project))
}

/// An open project: its file plus the tasks loaded from it.
#[derive(Debug, Clone)]
pub struct ProjectSession {
    pub project: Project,
    pub store: TaskStore,
}

impl ProjectSession {
    pub fn open(project: Project) -> Result<Self> {
        let last_id = project.load_meta().last_id;
        let store = TaskStore::load(&project.file_path)?.with_last_id(last_id);
        debug!(project = %project.display_name, tasks = store.tasks.len(), "opened project");
        Ok(ProjectSession { project, store })
    }

    pub fn save(&self) -> Result<()> {
        self.store.save(&self.project.file_path)?;
        self.project.save_meta(self.store.next_id() - 1)
    }

    /// Run the scheduler and swap in its result.
    pub fn reschedule(&mut self, scheduler: &Scheduler) -> ScheduleReport {
        let schedule = scheduler.schedule(&self.store.tasks);
        self.store.tasks = schedule.tasks;
        schedule.report
    }
}
