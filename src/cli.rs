use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::Level;

use crate::cmd::Commands;
use crate::scheduler::DependencyOrder;

/// Work-breakdown task lists with a workday scheduler.
/// Projects live in ~/.wbs (or --dir) as <name>_schedule.json files.
#[derive(Parser)]
#[command(name = "wbs", version, about = "Hierarchical task lists with workday scheduling")]
pub struct Cli {
    /// Directory holding project files.
    #[arg(long, global = true, env = "WBS_DIR")]
    pub dir: Option<PathBuf>,

    /// Project file to use instead of the most recently modified project.
    #[arg(long, global = true, env = "WBS_FILE")]
    pub file: Option<PathBuf>,

    /// Order in which dependent tasks are scheduled.
    #[arg(long, global = true, value_enum)]
    pub order: Option<DependencyOrder>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_level_from_flags() {
        let cli = Cli::parse_from(["wbs", "list"]);
        assert_eq!(cli.log_level(), Level::WARN);
        let cli = Cli::parse_from(["wbs", "-vv", "list"]);
        assert_eq!(cli.log_level(), Level::DEBUG);
        let cli = Cli::parse_from(["wbs", "list", "--quiet"]);
        assert_eq!(cli.log_level(), Level::ERROR);
    }

    #[test]
    fn test_global_order_flag() {
        let cli = Cli::parse_from(["wbs", "schedule", "--order", "topological"]);
        assert_eq!(cli.order, Some(DependencyOrder::Topological));
    }
}
