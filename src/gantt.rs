//! Projection of scheduled tasks for a Gantt chart renderer.

use serde::{Deserialize, Serialize};

use crate::calendar::format_iso;
use crate::task::Task;

/// One bar as a Frappe-style Gantt widget expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GanttBar {
    pub id: String,
    pub name: String,
    /// `YYYY-MM-DD`
    pub start: String,
    /// `YYYY-MM-DD`
    pub end: String,
    pub progress: u8,
    pub dependencies: Vec<String>,
}

/// Build chart bars in list order.
///
/// Tasks without a name, start or finish (or whose dates do not parse) have
/// nothing to draw and are left out.
pub fn project(tasks: &[Task]) -> Vec<GanttBar> {
    tasks
        .iter()
        .filter(|t| !t.is_placeholder())
        .filter_map(|t| {
            let start = t.start_date()?;
            let end = t.finish_date()?;
            Some(GanttBar {
                id: t.id.to_string(),
                name: t.name.clone(),
                start: format_iso(start),
                end: format_iso(end),
                progress: 0,
                dependencies: t.predecessor_labels(),
            })
        })
        .collect()
}
