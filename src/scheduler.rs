//! Two-pass scheduling engine.
//!
//! Pass 1 dates every leaf task from its predecessors, its authored start
//! or today, then stretches it over its duration in workdays. Pass 2 walks
//! the list backwards and sets each summary task to the span of its direct
//! children.
//!
//! In [`DependencyOrder::Listed`] mode leaves are visited in list order and
//! a predecessor's `finish` is read as it stands at that moment. A
//! predecessor listed below its dependent has not been rescheduled yet, so
//! its previous finish is used (a *stale read*). Stale reads are counted in
//! the [`ScheduleReport`]. [`DependencyOrder::Topological`] visits every
//! leaf after its leaf predecessors instead.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calendar::{self, add_workdays, format_date};
use crate::hierarchy::classify;
use crate::task::Task;

/// Order in which leaf tasks are visited by the forward pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyOrder {
    /// List order; predecessors listed later are read with their previous dates.
    #[default]
    Listed,
    /// Predecessors first; ties and cycles fall back to list order.
    Topological,
}

/// A dependent task that read a predecessor's finish before that
/// predecessor was rescheduled in the same run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleRead {
    pub task: u64,
    pub predecessor: u64,
    pub reason: StaleReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// A leaf predecessor visited after its dependent: listed below it, or
    /// on a predecessor cycle.
    NotYetScheduled,
    /// A summary predecessor; summaries are rolled up after every leaf.
    Summary,
}

/// What a scheduling run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub leaves_scheduled: usize,
    pub summaries_rolled_up: usize,
    /// Leaves with no predecessor date and no usable start.
    pub defaulted_to_today: Vec<u64>,
    pub stale_reads: Vec<StaleRead>,
    /// Leaves on (or downstream of) a predecessor cycle in topological mode.
    pub cyclic: Vec<u64>,
}

/// Output of [`Scheduler::schedule`].
#[derive(Debug, Clone)]
pub struct Schedule {
    pub tasks: Vec<Task>,
    pub report: ScheduleReport,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    today: NaiveDate,
    order: DependencyOrder,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            today: calendar::today(),
            order: DependencyOrder::default(),
        }
    }

    /// Date used for leaves that have nothing else to start from.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_order(mut self, order: DependencyOrder) -> Self {
        self.order = order;
        self
    }

    pub fn order(&self) -> DependencyOrder {
        self.order
    }

    /// Schedule a copy of `tasks`.
    ///
    /// The input is left untouched, so a caller holding the list never sees
    /// a half-scheduled state. Ids, order and fields other than `start`,
    /// `finish`, `duration` (summaries only) and `is_summary` are preserved.
    /// Placeholder rows pass through unchanged.
    pub fn schedule(&self, tasks: &[Task]) -> Schedule {
        let mut tasks = tasks.to_vec();
        let mut report = ScheduleReport::default();

        let summaries = classify(&mut tasks);
        debug!(tasks = tasks.len(), summaries, order = ?self.order, "classified tasks");

        self.forward_pass(&mut tasks, &mut report);
        report.summaries_rolled_up = roll_up_summaries(&mut tasks);

        info!(
            leaves = report.leaves_scheduled,
            summaries = report.summaries_rolled_up,
            stale_reads = report.stale_reads.len(),
            "schedule complete"
        );
        Schedule { tasks, report }
    }

    fn forward_pass(&self, tasks: &mut [Task], report: &mut ScheduleReport) {
        // Later duplicates of an id shadow earlier ones.
        let index: HashMap<u64, usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_placeholder())
            .map(|(i, t)| (t.id, i))
            .collect();

        let visit = match self.order {
            DependencyOrder::Listed => leaf_indices(tasks),
            DependencyOrder::Topological => {
                let (order, cyclic) = topological_leaf_order(tasks, &index);
                if !cyclic.is_empty() {
                    let ids: Vec<u64> = cyclic.iter().map(|&i| tasks[i].id).collect();
                    warn!(tasks = ?ids, "predecessor cycle; scheduling these tasks in list order");
                    report.cyclic = ids;
                }
                order
            }
        };

        let mut scheduled: HashSet<usize> = HashSet::with_capacity(visit.len());
        for idx in visit {
            self.schedule_leaf(tasks, idx, &index, &scheduled, report);
            scheduled.insert(idx);
            report.leaves_scheduled += 1;
        }
    }

    fn schedule_leaf(
        &self,
        tasks: &mut [Task],
        idx: usize,
        index: &HashMap<u64, usize>,
        scheduled: &HashSet<usize>,
        report: &mut ScheduleReport,
    ) {
        let task = &tasks[idx];
        let mut latest_predecessor_finish: Option<NaiveDate> = None;

        for pred in task.predecessor_ids() {
            let Some(&p) = index.get(&pred) else {
                debug!(task = task.id, predecessor = pred, "ignoring unknown predecessor");
                continue;
            };
            let reason = if tasks[p].is_summary {
                Some(StaleReason::Summary)
            } else if !scheduled.contains(&p) {
                Some(StaleReason::NotYetScheduled)
            } else {
                None
            };
            if let Some(reason) = reason {
                debug!(task = task.id, predecessor = pred, ?reason, "predecessor not yet scheduled in this run");
                report.stale_reads.push(StaleRead {
                    task: task.id,
                    predecessor: pred,
                    reason,
                });
            }
            if let Some(finish) = tasks[p].finish_date() {
                latest_predecessor_finish = Some(match latest_predecessor_finish {
                    Some(current) => current.max(finish),
                    None => finish,
                });
            }
        }

        let start = match latest_predecessor_finish {
            Some(finish) => add_workdays(finish, 1),
            None => match task.start_date() {
                Some(start) => start,
                None => {
                    report.defaulted_to_today.push(task.id);
                    self.today
                }
            },
        };
        let finish = add_workdays(start, task.effective_duration().saturating_sub(1));

        let task = &mut tasks[idx];
        task.start = Some(format_date(Some(start)));
        task.finish = Some(format_date(Some(finish)));
        debug!(task = task.id, start = %start, finish = %finish, "scheduled leaf");
    }
}

/// Set every summary task to the span of its direct children.
///
/// Tasks are visited last to first, so a nested summary listed after its
/// parent is settled before the parent reads it. A bound with no parseable
/// child value keeps its previous text. `is_summary` must already be set.
/// Returns the number of summaries updated.
pub fn roll_up_summaries(tasks: &mut [Task]) -> usize {
    let mut children: HashMap<u64, Vec<usize>> = HashMap::new();
    for (i, t) in tasks.iter().enumerate() {
        if t.is_placeholder() {
            continue;
        }
        if let Some(p) = t.parent_id.filter(|&p| p != t.id) {
            children.entry(p).or_default().push(i);
        }
    }

    let mut rolled = 0;
    for i in (0..tasks.len()).rev() {
        if !tasks[i].is_summary {
            continue;
        }
        let Some(kids) = children.get(&tasks[i].id) else {
            continue;
        };
        if kids.is_empty() {
            continue;
        }

        let min_start = kids.iter().filter_map(|&k| tasks[k].start_date()).min();
        let max_finish = kids.iter().filter_map(|&k| tasks[k].finish_date()).max();

        let summary = &mut tasks[i];
        if let Some(start) = min_start {
            summary.start = Some(format_date(Some(start)));
        }
        if let Some(finish) = max_finish {
            summary.finish = Some(format_date(Some(finish)));
        }
        summary.duration = Some(0);
        rolled += 1;
        debug!(task = summary.id, start = ?min_start, finish = ?max_finish, "rolled up summary");
    }
    rolled
}

fn leaf_indices(tasks: &[Task]) -> Vec<usize> {
    tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_placeholder() && !t.is_summary)
        .map(|(i, _)| i)
        .collect()
}

/// Kahn's algorithm over leaf-to-leaf predecessor edges.
///
/// Ready tasks are taken lowest list index first. Returns the visit order
/// and the indices that could not be ordered because of a cycle; those are
/// appended to the order in list order.
fn topological_leaf_order(tasks: &[Task], index: &HashMap<u64, usize>) -> (Vec<usize>, Vec<usize>) {
    let leaves = leaf_indices(tasks);
    let leaf_set: HashSet<usize> = leaves.iter().copied().collect();

    let mut in_degree: HashMap<usize, usize> = leaves.iter().map(|&i| (i, 0)).collect();
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();

    for &i in &leaves {
        let preds: BTreeSet<usize> = tasks[i]
            .predecessor_ids()
            .into_iter()
            .filter_map(|id| index.get(&id).copied())
            .filter(|p| *p != i && leaf_set.contains(p))
            .collect();
        for p in preds {
            dependents.entry(p).or_default().push(i);
            if let Some(degree) = in_degree.get_mut(&i) {
                *degree += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(leaves.len());

    while let Some(i) = ready.pop_first() {
        order.push(i);
        if let Some(next) = dependents.get(&i) {
            for &d in next {
                if let Some(degree) = in_degree.get_mut(&d) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(d);
                    }
                }
            }
        }
    }

    let placed: HashSet<usize> = order.iter().copied().collect();
    let cyclic: Vec<usize> = leaves.into_iter().filter(|i| !placed.contains(i)).collect();
    order.extend(cyclic.iter().copied());
    (order, cyclic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{is_workday, parse_date};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn leaf(id: u64, duration: Option<u32>, start: Option<&str>, preds: Option<&str>) -> Task {
        let mut t = Task::new(id, format!("Task {id}"));
        t.duration = duration;
        t.start = start.map(str::to_string);
        t.predecessors = preds.map(str::to_string);
        t
    }

    fn child(id: u64, parent: u64, duration: u32, start: &str) -> Task {
        let mut t = leaf(id, Some(duration), Some(start), None);
        t.parent_id = Some(parent);
        t
    }

    fn scheduler() -> Scheduler {
        Scheduler::new().with_today(ymd(2025, 1, 6))
    }

    fn dates(task: &Task) -> (&str, &str) {
        (task.start.as_deref().unwrap_or(""), task.finish.as_deref().unwrap_or(""))
    }

    #[test]
    fn test_leaf_finish_spans_duration_in_workdays() {
        for d in 1..15u32 {
            let tasks = vec![leaf(1, Some(d), Some("08/01/2025"), None)];
            let out = scheduler().schedule(&tasks);
            let t = &out.tasks[0];
            let start = parse_date(t.start.as_deref().unwrap()).unwrap();
            let finish = parse_date(t.finish.as_deref().unwrap()).unwrap();
            assert_eq!(finish, add_workdays(start, d - 1));
            assert!(is_workday(finish));
            assert!(finish >= start);
        }
    }

    #[test]
    fn test_single_day_and_zero_duration_finish_on_start() {
        let tasks = vec![
            leaf(1, Some(1), Some("08/01/2025"), None),
            leaf(2, Some(0), Some("08/01/2025"), None),
            leaf(3, None, Some("08/01/2025"), None),
        ];
        let out = scheduler().schedule(&tasks);
        for t in &out.tasks {
            assert_eq!(dates(t), ("08/01/2025", "08/01/2025"));
        }
    }

    #[test]
    fn test_missing_start_defaults_to_today() {
        let tasks = vec![leaf(1, Some(3), None, None), leaf(2, Some(1), Some("garbage"), None)];
        let out = scheduler().schedule(&tasks);
        assert_eq!(dates(&out.tasks[0]), ("06/01/2025", "08/01/2025"));
        assert_eq!(dates(&out.tasks[1]), ("06/01/2025", "06/01/2025"));
        assert_eq!(out.report.defaulted_to_today, vec![1, 2]);
    }

    #[test]
    fn test_predecessor_overrides_authored_start() {
        let tasks = vec![
            leaf(1, Some(3), Some("06/01/2025"), None),
            leaf(2, Some(2), Some("01/03/2025"), Some("1")),
        ];
        let out = scheduler().schedule(&tasks);
        assert_eq!(dates(&out.tasks[0]), ("06/01/2025", "08/01/2025"));
        assert_eq!(dates(&out.tasks[1]), ("09/01/2025", "10/01/2025"));
    }

    #[test]
    fn test_predecessor_finishing_friday_starts_monday() {
        let tasks = vec![
            leaf(1, Some(5), Some("06/01/2025"), None),
            leaf(2, Some(1), None, Some("1")),
        ];
        let out = scheduler().schedule(&tasks);
        assert_eq!(dates(&out.tasks[0]), ("06/01/2025", "10/01/2025"));
        assert_eq!(dates(&out.tasks[1]), ("13/01/2025", "13/01/2025"));
    }

    #[test]
    fn test_latest_predecessor_wins() {
        let tasks = vec![
            leaf(1, Some(1), Some("10/01/2025"), None),
            leaf(2, Some(1), Some("15/01/2025"), None),
            leaf(3, Some(1), None, Some("1;2")),
        ];
        let out = scheduler().schedule(&tasks);
        assert_eq!(out.tasks[0].finish.as_deref(), Some("10/01/2025"));
        assert_eq!(out.tasks[1].finish.as_deref(), Some("15/01/2025"));
        assert_eq!(dates(&out.tasks[2]), ("16/01/2025", "16/01/2025"));
    }

    #[test]
    fn test_malformed_and_unknown_predecessors_ignored() {
        let tasks = vec![
            leaf(3, Some(2), Some("06/01/2025"), None),
            leaf(4, Some(1), Some("20/01/2025"), Some("abc;  ;3;99")),
        ];
        let out = scheduler().schedule(&tasks);
        assert_eq!(dates(&out.tasks[0]), ("06/01/2025", "07/01/2025"));
        assert_eq!(dates(&out.tasks[1]), ("08/01/2025", "08/01/2025"));
        assert!(out.report.stale_reads.is_empty());
    }

    #[test]
    fn test_predecessor_without_dates_falls_back_to_start() {
        // Task 1 is listed later and has never been scheduled, so it has no finish yet.
        let tasks = vec![
            leaf(2, Some(1), Some("07/01/2025"), Some("1")),
            leaf(1, Some(1), Some("20/01/2025"), None),
        ];
        let out = scheduler().schedule(&tasks);
        assert_eq!(dates(&out.tasks[0]), ("07/01/2025", "07/01/2025"));
        assert_eq!(
            out.report.stale_reads,
            vec![StaleRead { task: 2, predecessor: 1, reason: StaleReason::NotYetScheduled }]
        );
    }

    #[test]
    fn test_listed_order_reads_stale_predecessor() {
        let mut pred = leaf(2, Some(2), Some("13/01/2025"), None);
        pred.finish = Some("03/01/2025".into());
        let tasks = vec![leaf(1, Some(1), None, Some("2")), pred];

        let out = scheduler().schedule(&tasks);
        // Friday 03/01 from the previous run -> Monday 06/01.
        assert_eq!(dates(&out.tasks[0]), ("06/01/2025", "06/01/2025"));
        assert_eq!(dates(&out.tasks[1]), ("13/01/2025", "14/01/2025"));
        assert_eq!(
            out.report.stale_reads,
            vec![StaleRead { task: 1, predecessor: 2, reason: StaleReason::NotYetScheduled }]
        );

        // A second run picks up the fresh finish.
        let again = scheduler().schedule(&out.tasks);
        assert_eq!(dates(&again.tasks[0]), ("15/01/2025", "15/01/2025"));
    }

    #[test]
    fn test_summary_predecessor_reported_as_summary_read() {
        let mut phase = leaf(10, None, None, None);
        phase.finish = Some("08/01/2025".into());
        let tasks = vec![
            phase,
            child(11, 10, 2, "06/01/2025"),
            leaf(12, Some(1), None, Some("10")),
        ];
        let out = scheduler().schedule(&tasks);
        // Summary finish from the previous run, Wednesday 08/01.
        assert_eq!(dates(&out.tasks[2]), ("09/01/2025", "09/01/2025"));
        assert_eq!(
            out.report.stale_reads,
            vec![StaleRead { task: 12, predecessor: 10, reason: StaleReason::Summary }]
        );
    }

    #[test]
    fn test_topological_order_reads_fresh_predecessor() {
        let mut pred = leaf(2, Some(2), Some("13/01/2025"), None);
        pred.finish = Some("03/01/2025".into());
        let tasks = vec![leaf(1, Some(1), None, Some("2")), pred];

        let out = scheduler().with_order(DependencyOrder::Topological).schedule(&tasks);
        assert_eq!(dates(&out.tasks[0]), ("15/01/2025", "15/01/2025"));
        assert!(out.report.stale_reads.is_empty());
        assert!(out.report.cyclic.is_empty());
        // Output keeps list order.
        assert_eq!(out.tasks[0].id, 1);
    }

    #[test]
    fn test_topological_chain() {
        let tasks = vec![
            leaf(3, Some(1), None, Some("2")),
            leaf(2, Some(2), None, Some("1")),
            leaf(1, Some(3), Some("06/01/2025"), None),
        ];
        let out = scheduler().with_order(DependencyOrder::Topological).schedule(&tasks);
        assert_eq!(dates(&out.tasks[2]), ("06/01/2025", "08/01/2025"));
        assert_eq!(dates(&out.tasks[1]), ("09/01/2025", "10/01/2025"));
        assert_eq!(dates(&out.tasks[0]), ("13/01/2025", "13/01/2025"));
    }

    #[test]
    fn test_topological_cycle_is_tolerated() {
        let tasks = vec![
            leaf(1, Some(1), Some("06/01/2025"), Some("2")),
            leaf(2, Some(1), Some("06/01/2025"), Some("1")),
            leaf(3, Some(1), Some("07/01/2025"), None),
        ];
        let out = scheduler().with_order(DependencyOrder::Topological).schedule(&tasks);
        assert_eq!(out.report.cyclic, vec![1, 2]);
        assert_eq!(out.report.leaves_scheduled, 3);
        assert!(out.tasks.iter().all(|t| t.start.is_some() && t.finish.is_some()));
    }

    #[test]
    fn test_roll_up_uses_child_bounds() {
        let mut parent = Task::new(1, "Phase");
        parent.duration = Some(9);
        let mut tasks = vec![parent];
        for (id, start, finish) in [
            (2, "06/01/2025", "10/01/2025"),
            (3, "08/01/2025", "12/01/2025"),
            (4, "09/01/2025", "20/01/2025"),
        ] {
            let mut t = Task::new(id, format!("Child {id}"));
            t.parent_id = Some(1);
            t.start = Some(start.into());
            t.finish = Some(finish.into());
            tasks.push(t);
        }
        classify(&mut tasks);
        assert_eq!(roll_up_summaries(&mut tasks), 1);
        assert_eq!(dates(&tasks[0]), ("06/01/2025", "20/01/2025"));
        assert_eq!(tasks[0].duration, Some(0));
    }

    #[test]
    fn test_roll_up_keeps_dates_when_children_have_none() {
        let mut parent = Task::new(1, "Phase");
        parent.start = Some("01/01/2025".into());
        parent.finish = Some("02/01/2025".into());
        let mut kid = Task::new(2, "Child");
        kid.parent_id = Some(1);
        let mut tasks = vec![parent, kid];
        classify(&mut tasks);
        roll_up_summaries(&mut tasks);
        assert_eq!(dates(&tasks[0]), ("01/01/2025", "02/01/2025"));
        assert_eq!(tasks[0].duration, Some(0));
    }

    #[test]
    fn test_nested_summaries_roll_up_through_levels() {
        let mut root = Task::new(1, "Project");
        root.duration = Some(4);
        let mut phase = Task::new(2, "Phase");
        phase.parent_id = Some(1);
        let tasks = vec![
            root,
            phase,
            child(3, 2, 2, "06/01/2025"),
            child(4, 2, 3, "09/01/2025"),
            child(5, 1, 1, "20/01/2025"),
        ];
        let out = scheduler().schedule(&tasks);
        assert_eq!(out.report.summaries_rolled_up, 2);
        assert_eq!(out.report.leaves_scheduled, 3);
        assert!(out.tasks[0].is_summary && out.tasks[1].is_summary);
        assert_eq!(dates(&out.tasks[1]), ("06/01/2025", "13/01/2025"));
        assert_eq!(dates(&out.tasks[0]), ("06/01/2025", "20/01/2025"));
        assert_eq!(out.tasks[0].duration, Some(0));
        assert_eq!(out.tasks[1].duration, Some(0));
    }

    #[test]
    fn test_summary_dates_are_not_authored() {
        let mut phase = Task::new(1, "Phase");
        phase.start = Some("01/06/2025".into());
        phase.predecessors = Some("9".into());
        let tasks = vec![phase, child(2, 1, 1, "07/01/2025")];
        let out = scheduler().schedule(&tasks);
        assert_eq!(dates(&out.tasks[0]), ("07/01/2025", "07/01/2025"));
    }

    #[test]
    fn test_placeholders_pass_through() {
        let mut blank = Task::new(9, "");
        blank.start = Some("nonsense".into());
        let tasks = vec![leaf(1, Some(1), Some("06/01/2025"), None), blank.clone()];
        let out = scheduler().schedule(&tasks);
        assert_eq!(out.tasks[1], blank);
        assert_eq!(out.report.leaves_scheduled, 1);
    }

    #[test]
    fn test_schedule_leaves_input_untouched_and_preserves_ids() {
        let tasks = vec![leaf(5, Some(2), None, None), leaf(2, Some(1), None, Some("5"))];
        let before = tasks.clone();
        let out = scheduler().schedule(&tasks);
        assert_eq!(tasks, before);
        let ids: Vec<u64> = out.tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![5, 2]);
        assert_eq!(out.tasks[1].name, "Task 2");
    }

    #[test]
    fn test_rescheduling_is_stable() {
        let tasks = vec![
            leaf(1, Some(3), Some("06/01/2025"), None),
            leaf(2, Some(2), None, Some("1")),
        ];
        let first = scheduler().schedule(&tasks);
        let second = scheduler().schedule(&first.tasks);
        assert_eq!(first.tasks, second.tasks);
    }
}
