//! Command implementations for the CLI interface.
//!
//! Each handler opens the project session it needs, applies its change,
//! reschedules when `auto_schedule` is on, and saves once at the end. The
//! engine itself never touches the disk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Subcommand};
use clap_complete::{generate, Shell};
use tracing::{debug, info, warn};

use crate::calendar::{self, format_date, parse_date_input};
use crate::cli::Cli;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::gantt;
use crate::hierarchy::{self, build_children_map, collect_ancestors, collect_descendants};
use crate::project::{create_project, discover_projects, most_recent_project, ProjectSession};
use crate::scheduler::{ScheduleReport, StaleRead, StaleReason};
use crate::store::{create_backup, TaskStore};
use crate::task::Task;

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new, empty project.
    New {
        /// Project name.
        name: String,
    },

    /// List projects in the data directory.
    Projects,

    /// Add a task.
    Add {
        /// Task name.
        name: String,
        /// Duration in workdays.
        #[arg(long, short)]
        duration: Option<u32>,
        /// Start date: DD/MM/YYYY, YYYY-MM-DD, "today" or "tomorrow".
        #[arg(long, short)]
        start: Option<String>,
        /// Predecessor ids separated by ';', e.g. "3;5".
        #[arg(long, short)]
        pred: Option<String>,
        /// Parent task id.
        #[arg(long)]
        parent: Option<u64>,
        #[arg(long)]
        resource: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Insert at this position (0 = top) instead of appending.
        #[arg(long)]
        at: Option<usize>,
    },

    /// List tasks in display order.
    List {
        /// Indent by hierarchy level.
        #[arg(long)]
        tree: bool,
    },

    /// Show one task with its children and ancestors.
    View {
        id: u64,
    },

    /// Edit a task's authored fields.
    Update {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, short)]
        duration: Option<u32>,
        #[arg(long, short)]
        start: Option<String>,
        #[arg(long, short)]
        pred: Option<String>,
        #[arg(long, conflicts_with = "clear_parent")]
        parent: Option<u64>,
        #[arg(long)]
        resource: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Make the task top-level.
        #[arg(long)]
        clear_parent: bool,
        /// Remove the authored start date.
        #[arg(long, conflicts_with = "start")]
        clear_start: bool,
        /// Remove all predecessors.
        #[arg(long, conflicts_with = "pred")]
        clear_pred: bool,
    },

    /// Delete tasks.
    Delete {
        #[arg(required = true)]
        ids: Vec<u64>,
        /// Also delete every descendant; otherwise children become top-level.
        #[arg(long)]
        cascade: bool,
    },

    /// Move a task to a new position in display order.
    Move {
        id: u64,
        /// Target position, 0 = top.
        index: usize,
    },

    /// Make tasks children of the row above them.
    Indent {
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Promote tasks one level up the hierarchy.
    Outdent {
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Recalculate all start and finish dates.
    Schedule {
        /// Date to start unconstrained tasks on (default: today).
        #[arg(long)]
        today: Option<String>,
    },

    /// Emit the Gantt chart projection as JSON.
    Gantt {
        /// Write to a file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Export the project in the wrapped exchange format.
    Export {
        /// Output path (default: project-<date>.json).
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Project name to record (default: the project's display name).
        #[arg(long)]
        name: Option<String>,
    },

    /// Replace the project's tasks with those from a JSON file.
    Import {
        input: PathBuf,
        /// Skip creating a backup before import.
        #[arg(long)]
        no_backup: bool,
    },

    /// Create a timestamped backup of the project file.
    Backup,

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Dispatch a parsed command.
pub fn run(command: Commands, settings: &Settings) -> Result<()> {
    match command {
        Commands::New { name } => cmd_new(settings, &name)?,
        Commands::Projects => cmd_projects(settings)?,
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Add { name, duration, start, pred, parent, resource, notes, at } => {
            let mut session = open(settings)?;
            let id = cmd_add(&mut session.store, name, duration, start, pred, parent, resource, notes, at)?;
            commit(settings, &mut session)?;
            println!("Added task {id}");
        }
        Commands::List { tree } => print_table(&open(settings)?.store.tasks, tree),
        Commands::View { id } => cmd_view(&open(settings)?.store, id)?,
        Commands::Update {
            id, name, duration, start, pred, parent, resource, notes, clear_parent, clear_start, clear_pred,
        } => {
            let mut session = open(settings)?;
            cmd_update(
                &mut session.store, id, name, duration, start, pred, parent, resource, notes,
                clear_parent, clear_start, clear_pred,
            )?;
            commit(settings, &mut session)?;
            println!("Updated task {id}");
        }
        Commands::Delete { ids, cascade } => {
            let mut session = open(settings)?;
            let removed = cmd_delete(&mut session.store, &ids, cascade)?;
            commit(settings, &mut session)?;
            println!("Deleted {removed} task(s)");
        }
        Commands::Move { id, index } => {
            let mut session = open(settings)?;
            hierarchy::move_task(&mut session.store.tasks, id, index)?;
            commit(settings, &mut session)?;
            let now = session.store.position(id).unwrap_or(index);
            println!("Moved task {id} to position {now}");
        }
        Commands::Indent { ids } => {
            let mut session = open(settings)?;
            let changed = hierarchy::indent(&mut session.store.tasks, &ids);
            commit(settings, &mut session)?;
            println!("Indented {changed} task(s)");
        }
        Commands::Outdent { ids } => {
            let mut session = open(settings)?;
            let changed = hierarchy::outdent(&mut session.store.tasks, &ids);
            commit(settings, &mut session)?;
            println!("Outdented {changed} task(s)");
        }
        Commands::Schedule { today } => {
            let mut session = open(settings)?;
            let report = cmd_schedule(settings, &mut session, today.as_deref())?;
            print_table(&session.store.tasks, true);
            print_report(&report);
        }
        Commands::Gantt { output } => cmd_gantt(&open(settings)?.store, output.as_deref())?,
        Commands::Export { output, name } => {
            let session = open(settings)?;
            let path = output.unwrap_or_else(default_export_path);
            let name = name.unwrap_or_else(|| session.project.display_name.clone());
            session.store.export(&path, &name)?;
            println!("Exported {} task(s) to {}", session.store.tasks.len(), path.display());
        }
        Commands::Import { input, no_backup } => {
            let mut session = open(settings)?;
            cmd_import(settings, &mut session, &input, no_backup)?;
        }
        Commands::Backup => {
            let path = create_backup(&settings.select_project()?.file_path)?;
            println!("Backup created: {}", path.display());
        }
    }
    Ok(())
}

fn open(settings: &Settings) -> Result<ProjectSession> {
    ProjectSession::open(settings.select_project()?)
}

/// Reschedule if configured, then save.
fn commit(settings: &Settings, session: &mut ProjectSession) -> Result<()> {
    if settings.auto_schedule {
        let report = session.reschedule(&settings.scheduler());
        log_report(&report);
    }
    session.save()
}

/// Create a new project file.
pub fn cmd_new(settings: &Settings, name: &str) -> Result<()> {
    let project = create_project(name, &settings.data_dir)?;
    println!("Created project '{}' at {}", project.display_name, project.file_path.display());
    Ok(())
}

/// List projects, marking the one commands would use by default.
pub fn cmd_projects(settings: &Settings) -> Result<()> {
    let projects = discover_projects(&settings.data_dir)?;
    if projects.is_empty() {
        println!("No projects in {}", settings.data_dir.display());
        return Ok(());
    }
    let current = most_recent_project(&settings.data_dir)?;
    for p in projects {
        let marker = if current.as_ref() == Some(&p) { "*" } else { " " };
        println!("{marker} {:<24} {}", p.display_name, p.file_path.display());
    }
    Ok(())
}

/// Add a new task and return its id.
#[allow(clippy::too_many_arguments)]
pub fn cmd_add(
    store: &mut TaskStore,
    name: String,
    duration: Option<u32>,
    start: Option<String>,
    pred: Option<String>,
    parent: Option<u64>,
    resource: Option<String>,
    notes: Option<String>,
    at: Option<usize>,
) -> Result<u64> {
    if let Some(p) = parent {
        if store.get(p).is_none() {
            return Err(Error::TaskNotFound(p));
        }
    }
    let name = required_name(&name)?;
    let id = store.next_id();
    let mut task = Task::new(id, name);
    task.duration = duration;
    task.start = start.as_deref().map(canonical_date).transpose()?;
    task.predecessors = non_empty(pred);
    task.parent_id = parent;
    task.resource = non_empty(resource);
    task.notes = non_empty(notes);
    store.insert(task, at);
    info!(task = id, "added task");
    Ok(id)
}

/// Update an existing task's authored fields.
#[allow(clippy::too_many_arguments)]
pub fn cmd_update(
    store: &mut TaskStore,
    id: u64,
    name: Option<String>,
    duration: Option<u32>,
    start: Option<String>,
    pred: Option<String>,
    parent: Option<u64>,
    resource: Option<String>,
    notes: Option<String>,
    clear_parent: bool,
    clear_start: bool,
    clear_pred: bool,
) -> Result<()> {
    if store.get(id).is_none() {
        return Err(Error::TaskNotFound(id));
    }
    // Validate everything before the first write.
    let name = name.as_deref().map(required_name).transpose()?;
    let start = start.as_deref().map(canonical_date).transpose()?;
    if let Some(p) = parent {
        hierarchy::set_parent(&mut store.tasks, id, Some(p))?;
    } else if clear_parent {
        hierarchy::set_parent(&mut store.tasks, id, None)?;
    }

    let task = store.get_mut(id).ok_or(Error::TaskNotFound(id))?;
    if let Some(name) = name {
        task.name = name;
    }
    if duration.is_some() {
        task.duration = duration;
    }
    if start.is_some() {
        task.start = start;
    } else if clear_start {
        task.start = None;
    }
    if pred.is_some() {
        task.predecessors = non_empty(pred);
    } else if clear_pred {
        task.predecessors = None;
    }
    if resource.is_some() {
        task.resource = non_empty(resource);
    }
    if notes.is_some() {
        task.notes = non_empty(notes);
    }
    Ok(())
}

/// Delete tasks (and optionally their descendants). Returns how many were removed.
pub fn cmd_delete(store: &mut TaskStore, ids: &[u64], cascade: bool) -> Result<usize> {
    if let Some(&missing) = ids.iter().find(|&&id| store.get(id).is_none()) {
        return Err(Error::TaskNotFound(missing));
    }
    let mut doomed: HashSet<u64> = ids.iter().copied().collect();
    if cascade {
        let child_map = build_children_map(&store.tasks);
        for &id in ids {
            collect_descendants(id, &child_map, &mut doomed);
        }
    }
    Ok(store.remove_ids(&doomed))
}

/// Run the scheduler on the session and save the result.
pub fn cmd_schedule(settings: &Settings, session: &mut ProjectSession, today: Option<&str>) -> Result<ScheduleReport> {
    let mut scheduler = settings.scheduler();
    if let Some(text) = today {
        scheduler = scheduler.with_today(parse_date_input(text, calendar::today())?);
    }
    debug!(order = ?scheduler.order(), "scheduling");
    let report = session.reschedule(&scheduler);
    session.save()?;
    log_report(&report);
    Ok(report)
}

/// Write the Gantt projection to a file or stdout.
pub fn cmd_gantt(store: &TaskStore, output: Option<&Path>) -> Result<()> {
    let bars = gantt::project(&store.tasks);
    let json = serde_json::to_string_pretty(&bars)
        .map_err(|e| Error::json(output.unwrap_or_else(|| Path::new("<stdout>")), e))?;
    match output {
        Some(path) => {
            fs::write(path, json).map_err(|e| Error::io(path, e))?;
            println!("Wrote {} bar(s) to {}", bars.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Replace the session's tasks with an imported file, backing up first.
pub fn cmd_import(settings: &Settings, session: &mut ProjectSession, input: &Path, no_backup: bool) -> Result<()> {
    let imported = TaskStore::read(input)?;
    if imported.tasks.is_empty() {
        println!("No tasks found in {}", input.display());
        return Ok(());
    }

    if !no_backup && session.project.file_path.exists() {
        match create_backup(&session.project.file_path) {
            Ok(path) => println!("Created backup: {}", path.display()),
            Err(e) => {
                warn!("backup failed: {e}");
                if !confirm("Continue without backup? (y/N): ")? {
                    println!("Import cancelled.");
                    return Ok(());
                }
            }
        }
    }

    let count = imported.tasks.len();
    session.store.tasks = imported.tasks;
    commit(settings, session)?;
    match imported.project_name {
        Some(name) => println!("Imported {count} task(s) from project '{name}'"),
        None => println!("Imported {count} task(s)"),
    }
    Ok(())
}

/// Print a shell completion script to stdout.
pub fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "wbs", &mut io::stdout());
}

/// Show details about a specific task.
pub fn cmd_view(store: &TaskStore, id: u64) -> Result<()> {
    let task = store.get(id).ok_or(Error::TaskNotFound(id))?;
    let dash = |s: &Option<String>| s.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| "-".into());

    println!("ID:           {}", task.id);
    println!("Name:         {}", task.name);
    println!("Duration:     {}", task.duration.map(|d| d.to_string()).unwrap_or_else(|| "-".into()));
    println!("Start:        {}", dash(&task.start));
    println!("Finish:       {}", dash(&task.finish));
    println!("Predecessors: {}", dash(&task.predecessors));
    println!("Parent:       {}", task.parent_id.map(|p| p.to_string()).unwrap_or_else(|| "-".into()));
    println!("Resource:     {}", dash(&task.resource));
    println!("Notes:        {}", dash(&task.notes));

    let chain = collect_ancestors(id, &store.tasks);
    if chain.is_empty() {
        println!("Ancestors:    -");
    } else {
        let chain: Vec<String> = chain.iter().map(u64::to_string).collect();
        println!("Ancestors:    {}", chain.join(" -> "));
    }

    let child_map = build_children_map(&store.tasks);
    println!("Children:");
    if child_map.contains_key(&id) {
        let index: HashMap<u64, &Task> = store.tasks.iter().map(|t| (t.id, t)).collect();
        print_subtree(id, &child_map, &index, 1);
    } else {
        println!("  -");
    }
    Ok(())
}

fn print_subtree(id: u64, child_map: &BTreeMap<u64, Vec<u64>>, index: &HashMap<u64, &Task>, depth: usize) {
    let Some(children) = child_map.get(&id) else {
        return;
    };
    for c in children {
        if let Some(t) = index.get(c) {
            let span = format!(
                "{} - {}",
                t.start.as_deref().unwrap_or("?"),
                t.finish.as_deref().unwrap_or("?")
            );
            println!("{}- {} [{}] (#{})", "  ".repeat(depth), t.name, span, t.id);
            if depth < 64 {
                print_subtree(*c, child_map, index, depth + 1);
            }
        }
    }
}

/// Print tasks as a table, optionally indented by hierarchy level.
pub fn print_table(tasks: &[Task], tree: bool) {
    let depths = if tree { hierarchy::depths(tasks) } else { HashMap::new() };
    let summaries = build_children_map(tasks);
    println!(
        "{:<5} {:>4} {:<10} {:<10} {:<10} {:<12} Name",
        "ID", "Dur", "Start", "Finish", "Pred", "Resource"
    );
    for t in tasks.iter().filter(|t| !t.is_placeholder()) {
        let indent = "  ".repeat(depths.get(&t.id).copied().unwrap_or(0));
        let marker = if tree && summaries.contains_key(&t.id) { "▸ " } else { "" };
        println!(
            "{:<5} {:>4} {:<10} {:<10} {:<10} {:<12} {}{}{}",
            t.id,
            t.duration.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            t.start.as_deref().unwrap_or("-"),
            t.finish.as_deref().unwrap_or("-"),
            truncate(t.predecessors.as_deref().unwrap_or("-"), 10),
            truncate(t.resource.as_deref().unwrap_or("-"), 12),
            indent,
            marker,
            t.name
        );
    }
}

fn print_report(report: &ScheduleReport) {
    println!(
        "\nScheduled {} task(s), rolled up {} summary task(s).",
        report.leaves_scheduled, report.summaries_rolled_up
    );
    if !report.defaulted_to_today.is_empty() {
        let ids: Vec<String> = report.defaulted_to_today.iter().map(u64::to_string).collect();
        println!("No start date or predecessor, started today: {}", ids.join(", "));
    }
    let (summary_reads, late_reads): (Vec<&StaleRead>, Vec<&StaleRead>) = report
        .stale_reads
        .iter()
        .partition(|r| r.reason == StaleReason::Summary);
    if !late_reads.is_empty() {
        println!(
            "{} dependency read(s) used a predecessor's previous finish because it was scheduled after its dependent:",
            late_reads.len()
        );
        for r in &late_reads {
            println!("  task {} <- predecessor {}", r.task, r.predecessor);
        }
        println!("Run `wbs schedule` again, or use `--order topological`.");
    }
    if !summary_reads.is_empty() {
        println!(
            "{} dependency read(s) used a summary task's previous dates, since summaries are rolled up last:",
            summary_reads.len()
        );
        for r in &summary_reads {
            println!("  task {} <- summary {}", r.task, r.predecessor);
        }
        println!("Run `wbs schedule` again to pick up the new summary dates.");
    }
    if !report.cyclic.is_empty() {
        let ids: Vec<String> = report.cyclic.iter().map(u64::to_string).collect();
        println!("Predecessor cycle involving task(s) {}; scheduled in list order.", ids.join(", "));
    }
}

fn log_report(report: &ScheduleReport) {
    info!(
        leaves = report.leaves_scheduled,
        summaries = report.summaries_rolled_up,
        "rescheduled project"
    );
    if !report.stale_reads.is_empty() {
        warn!(count = report.stale_reads.len(), "schedule used stale predecessor dates");
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// A blank name would turn the task into a placeholder row that is never saved.
fn required_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::EmptyTaskName);
    }
    Ok(name.to_string())
}

fn canonical_date(text: &str) -> Result<String> {
    Ok(format_date(Some(parse_date_input(text, calendar::today())?)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn default_export_path() -> PathBuf {
    PathBuf::from(format!("project-{}.json", calendar::today().format("%Y-%m-%d")))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush().map_err(|e| Error::io("<stdout>", e))?;
    let mut response = String::new();
    io::stdin()
        .read_line(&mut response)
        .map_err(|e| Error::io("<stdin>", e))?;
    Ok(response.trim().to_lowercase().starts_with('y'))
}
