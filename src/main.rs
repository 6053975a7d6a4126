//! # WBS - Work-Breakdown Scheduling CLI
//!
//! A command-line task list with a parent/child hierarchy and a workday
//! scheduling engine. Every edit recalculates start and finish dates:
//! leaf tasks are placed after their predecessors, summary tasks span their
//! children.
//!
//! ## Key Features
//!
//! - **Hierarchical Tasks**: Any task can become a summary by giving it children
//!   (`indent`, `outdent`, `--parent`)
//! - **Workday Scheduling**: Durations count Monday to Friday; predecessors push
//!   a task to the next workday after their finish
//! - **Multi-Project Support**: One `<name>_schedule.json` file per project
//! - **Exchange Format**: Export/import wrapped JSON, Gantt chart projection,
//!   timestamped backups
//!
//! ## Quick Start
//!
//! ```bash
//! wbs new "House Build"
//! wbs add "Foundations" --duration 5 --start 06/01/2025
//! wbs add "Framing" --duration 10 --pred 1
//! wbs list --tree
//! wbs gantt -o chart.json
//! ```
//!
//! ## Scheduling Order
//!
//! By default tasks are scheduled in display order, so a predecessor listed
//! below its dependent is read with its previous dates; `wbs schedule` reports
//! those reads. `--order topological` schedules predecessors first instead.
//!
//! Data is stored locally in `~/.wbs/` (override with `--dir` or `WBS_DIR`).
//! An optional `config.json` there sets `dependency_order`, `auto_schedule`
//! and `default_project`.

use clap::Parser;

pub mod calendar;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod gantt;
pub mod hierarchy;
pub mod project;
pub mod scheduler;
pub mod store;
pub mod task;

use cli::Cli;
use config::Settings;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = Settings::resolve(cli.dir, cli.file, cli.order)
        .and_then(|settings| cmd::run(cli.command, &settings));

    if let Err(e) = result {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
