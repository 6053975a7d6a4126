//! File-backed task store.
//!
//! A project file holds a JSON array of tasks. Exports wrap the same array
//! in `{ version, exportDate, projectName, tasks }`, and both shapes are
//! accepted when reading. Placeholder rows (blank names) are never written.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::task::{parse_leading_int, Task};

/// Version tag written into exports.
pub const EXPORT_VERSION: &str = "1.0";

/// The wrapped export form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub export_date: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    pub tasks: Vec<Task>,
}

/// Tasks read from a project or export file.
#[derive(Debug, Clone, Default)]
pub struct Imported {
    pub tasks: Vec<Task>,
    /// Present when the file was an export envelope that named its project.
    pub project_name: Option<String>,
}

/// In-memory task list for one project, in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStore {
    pub tasks: Vec<Task>,
    /// Highest id ever handed out, including deleted tasks.
    pub last_id: u64,
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        let last_id = max_id(&tasks);
        TaskStore { tasks, last_id }
    }

    /// Raise the high-water id, e.g. from a value saved alongside the project.
    pub fn with_last_id(mut self, last_id: u64) -> Self {
        self.last_id = self.last_id.max(last_id);
        self
    }

    /// Load a project file; a missing file is an empty project.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no project file yet, starting empty");
            return Ok(TaskStore::default());
        }
        let imported = Self::read(path)?;
        Ok(TaskStore::new(imported.tasks))
    }

    /// Parse a bare task array or an export envelope, dropping placeholders.
    pub fn read(path: &Path) -> Result<Imported> {
        let buf = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let value: Value = serde_json::from_str(&buf).map_err(|e| Error::json(path, e))?;

        let is_envelope = value.get("tasks").is_some_and(Value::is_array);
        let mut imported = if value.is_array() {
            Imported {
                tasks: serde_json::from_value(value).map_err(|e| Error::json(path, e))?,
                project_name: None,
            }
        } else if is_envelope {
            let envelope: ExportEnvelope =
                serde_json::from_value(value).map_err(|e| Error::json(path, e))?;
            Imported {
                tasks: envelope.tasks,
                project_name: envelope.project_name,
            }
        } else {
            return Err(Error::InvalidProjectFile {
                path: path.to_path_buf(),
            });
        };
        imported.tasks.retain(|t| !t.is_placeholder());
        debug!(path = %path.display(), tasks = imported.tasks.len(), "read task file");
        Ok(imported)
    }

    /// Save as a bare task array using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.persisted()).map_err(|e| Error::json(path, e))?;
        write_atomic(path, &data)
    }

    /// Write the wrapped export form.
    pub fn export(&self, path: &Path, project_name: &str) -> Result<()> {
        let envelope = ExportEnvelope {
            version: Some(EXPORT_VERSION.to_string()),
            export_date: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            project_name: Some(project_name.to_string()),
            tasks: self.persisted(),
        };
        let data = serde_json::to_string_pretty(&envelope).map_err(|e| Error::json(path, e))?;
        write_atomic(path, &data)?;
        info!(path = %path.display(), tasks = envelope.tasks.len(), "exported project");
        Ok(())
    }

    fn persisted(&self) -> Vec<Task> {
        self.tasks.iter().filter(|t| !t.is_placeholder()).cloned().collect()
    }

    /// Generate the next task ID. Ids of deleted tasks are never handed out again.
    pub fn next_id(&self) -> u64 {
        self.last_id.max(max_id(&self.tasks)) + 1
    }

    /// Get a task by ID.
    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Get a mutable reference to a task by ID.
    pub fn get_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Display position of a task.
    pub fn position(&self, id: u64) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Insert a task at `index` (clamped), or append when `None`.
    pub fn insert(&mut self, task: Task, index: Option<usize>) {
        match index {
            Some(i) => {
                let i = i.min(self.tasks.len());
                self.tasks.insert(i, task);
            }
            None => self.tasks.push(task),
        }
        self.last_id = self.last_id.max(max_id(&self.tasks));
    }

    /// Remove tasks by IDs and drop any parent or predecessor references
    /// pointing at them.
    pub fn remove_ids(&mut self, ids: &HashSet<u64>) -> usize {
        self.last_id = self.last_id.max(max_id(&self.tasks));
        let before = self.tasks.len();
        self.tasks.retain(|t| !ids.contains(&t.id));
        for t in self.tasks.iter_mut() {
            if t.parent_id.is_some_and(|p| ids.contains(&p)) {
                t.parent_id = None;
            }
            if let Some(preds) = t.predecessors.as_deref() {
                t.predecessors = drop_predecessors(preds, ids);
            }
        }
        before - self.tasks.len()
    }
}

fn max_id(tasks: &[Task]) -> u64 {
    tasks.iter().map(|t| t.id).max().unwrap_or(0)
}

/// Remove entries naming a deleted id; unrelated entries are kept verbatim.
fn drop_predecessors(preds: &str, ids: &HashSet<u64>) -> Option<String> {
    let kept: Vec<&str> = preds
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter(|p| {
            !parse_leading_int(p)
                .and_then(|n| u64::try_from(n).ok())
                .is_some_and(|n| ids.contains(&n))
        })
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(";"))
    }
}

fn write_atomic(path: &Path, data: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut f = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
    f.write_all(data.as_bytes()).map_err(|e| Error::io(&tmp, e))?;
    f.flush().map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Copy a project file into `<dir>/backup/<timestamp>_<file>`.
pub fn create_backup(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(Error::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "project file does not exist"),
        ));
    }

    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let backup_dir = parent_dir.join("backup");
    fs::create_dir_all(&backup_dir).map_err(|e| Error::io(&backup_dir, e))?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("schedule.json");
    let backup_path = backup_dir.join(format!("{timestamp}_{file_name}"));

    fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;
    info!(from = %path.display(), to = %backup_path.display(), "created backup");
    Ok(backup_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample() -> TaskStore {
        let mut a = Task::new(1, "Design");
        a.duration = Some(3);
        a.start = Some("06/01/2025".into());
        let mut b = Task::new(2, "Build");
        b.duration = Some(2);
        b.predecessors = Some("1".into());
        b.parent_id = Some(3);
        let c = Task::new(3, "Delivery");
        TaskStore::new(vec![a, c, b])
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::load(&dir.path().join("none.json")).unwrap();
        assert!(store.tasks.is_empty());
        assert_eq!(store.next_id(), 1);
    }

    #[test]
    fn test_save_and_load_drop_placeholders() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p_schedule.json");
        let mut store = sample();
        store.tasks.push(Task::new(9, ""));
        store.save(&path).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.as_array().unwrap().len(), 3);
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = TaskStore::load(&path).unwrap();
        assert_eq!(loaded.tasks, sample().tasks);
    }

    #[test]
    fn test_read_accepts_envelope() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.json");
        fs::write(
            &path,
            r#"{"version":"1.0","exportDate":"2025-01-06T10:00:00.000Z","projectName":"House",
                "tasks":[{"id":1,"name":"Dig"},{"id":2,"name":""}]}"#,
        )
        .unwrap();
        let imported = TaskStore::read(&path).unwrap();
        assert_eq!(imported.project_name.as_deref(), Some("House"));
        assert_eq!(imported.tasks.len(), 1);
        assert_eq!(imported.tasks[0].name, "Dig");
    }

    #[test]
    fn test_read_rejects_wrong_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"items": []}"#).unwrap();
        assert!(matches!(TaskStore::read(&path), Err(Error::InvalidProjectFile { .. })));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(TaskStore::read(&path), Err(Error::Json { .. })));
    }

    #[test]
    fn test_export_import_round_trip_reschedules_identically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.json");
        let scheduler = Scheduler::new().with_today(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());

        let scheduled = scheduler.schedule(&sample().tasks);
        TaskStore::new(scheduled.tasks.clone()).export(&path, "House").unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], EXPORT_VERSION);
        assert_eq!(raw["projectName"], "House");
        assert!(raw["exportDate"].is_string());

        let imported = TaskStore::read(&path).unwrap();
        let again = scheduler.schedule(&imported.tasks);
        assert_eq!(again.tasks, scheduled.tasks);
    }

    #[test]
    fn test_remove_ids_clears_dangling_parents() {
        let mut store = sample();
        let removed = store.remove_ids(&HashSet::from([3]));
        assert_eq!(removed, 1);
        assert_eq!(store.get(2).unwrap().parent_id, None);
        assert!(store.get(3).is_none());
    }

    #[test]
    fn test_remove_ids_drops_predecessor_references() {
        let mut store = sample();
        store.get_mut(3).unwrap().predecessors = Some("1; 2".into());
        store.remove_ids(&HashSet::from([1]));
        assert_eq!(store.get(2).unwrap().predecessors, None);
        assert_eq!(store.get(3).unwrap().predecessors.as_deref(), Some("2"));
    }

    #[test]
    fn test_deleted_ids_are_not_reused() {
        let mut store = sample();
        store.remove_ids(&HashSet::from([3]));
        store.remove_ids(&HashSet::from([2]));
        assert_eq!(store.next_id(), 4);

        let reloaded = TaskStore::new(store.tasks.clone()).with_last_id(store.last_id);
        assert_eq!(reloaded.next_id(), 4);
    }

    #[test]
    fn test_insert_and_next_id() {
        let mut store = sample();
        assert_eq!(store.next_id(), 4);
        store.insert(Task::new(4, "Inspect"), Some(0));
        assert_eq!(store.position(4), Some(0));
        store.insert(Task::new(5, "Close out"), Some(99));
        assert_eq!(store.position(5), Some(4));
        store.get_mut(5).unwrap().notes = Some("final".into());
        assert_eq!(store.get(5).unwrap().notes.as_deref(), Some("final"));
    }

    #[test]
    fn test_create_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p_schedule.json");
        sample().save(&path).unwrap();
        let backup = create_backup(&path).unwrap();
        assert!(backup.starts_with(dir.path().join("backup")));
        assert_eq!(fs::read(&backup).unwrap(), fs::read(&path).unwrap());

        assert!(create_backup(&dir.path().join("missing.json")).is_err());
    }
}
