//! Parent/child structure over the flat task list.
//!
//! Tasks only carry a `parent_id`. Everything else (children, depth,
//! summary status) is derived from the list on demand and thrown away
//! afterwards, so deleting or reparenting a task can never leave a stale
//! child entry behind.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::warn;

use crate::error::{Error, Result};
use crate::task::Task;

/// Deepest parent chain followed before assuming a cycle.
const MAX_DEPTH: usize = 64;

/// Map each parent id to its direct children, in list order.
///
/// Placeholder rows are ignored on both sides, as is a task naming itself
/// as its own parent.
pub fn build_children_map(tasks: &[Task]) -> BTreeMap<u64, Vec<u64>> {
    let mut map: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for t in tasks.iter().filter(|t| !t.is_placeholder()) {
        if let Some(p) = t.parent_id {
            if p != t.id {
                map.entry(p).or_default().push(t.id);
            }
        }
    }
    map
}

/// Set `is_summary` on every task: true iff some other task names it as parent.
///
/// Returns the number of summary tasks.
pub fn classify(tasks: &mut [Task]) -> usize {
    let children = build_children_map(tasks);
    let mut summaries = 0;
    for t in tasks.iter_mut() {
        t.is_summary = !t.is_placeholder() && children.contains_key(&t.id);
        if t.is_summary {
            summaries += 1;
        }
    }
    summaries
}

/// Recursively collect all descendant task ids below `root`.
pub fn collect_descendants(root: u64, child_map: &BTreeMap<u64, Vec<u64>>, out: &mut HashSet<u64>) {
    if let Some(children) = child_map.get(&root) {
        for &c in children {
            if out.insert(c) {
                collect_descendants(c, child_map, out);
            }
        }
    }
}

/// Parent chain of `id`, closest first. Stops at a missing task or a cycle.
pub fn collect_ancestors(id: u64, tasks: &[Task]) -> Vec<u64> {
    let parents: HashMap<u64, Option<u64>> = tasks.iter().map(|t| (t.id, t.parent_id)).collect();
    let mut chain = Vec::new();
    let mut seen = HashSet::from([id]);
    let mut current = id;
    while let Some(Some(p)) = parents.get(&current) {
        if !seen.insert(*p) {
            break;
        }
        chain.push(*p);
        current = *p;
    }
    chain
}

/// Whether making `parent` the parent of `task` would put `task` on its own ancestor chain.
pub fn would_create_cycle(tasks: &[Task], task: u64, parent: u64) -> bool {
    parent == task || collect_ancestors(parent, tasks).contains(&task)
}

/// Reparent `task` under `parent` (or make it root), refusing cycles.
pub fn set_parent(tasks: &mut [Task], task: u64, parent: Option<u64>) -> Result<()> {
    if let Some(p) = parent {
        if !tasks.iter().any(|t| t.id == p) {
            return Err(Error::TaskNotFound(p));
        }
        if would_create_cycle(tasks, task, p) {
            return Err(Error::ParentCycle { task, parent: p });
        }
    }
    let t = tasks
        .iter_mut()
        .find(|t| t.id == task)
        .ok_or(Error::TaskNotFound(task))?;
    t.parent_id = parent;
    Ok(())
}

/// Nesting depth of every task (roots are 0).
pub fn depths(tasks: &[Task]) -> HashMap<u64, usize> {
    let parents: HashMap<u64, Option<u64>> = tasks.iter().map(|t| (t.id, t.parent_id)).collect();
    let mut depth_map = HashMap::new();
    for t in tasks {
        let mut depth = 0usize;
        let mut cur = t.parent_id;
        while let Some(pid) = cur {
            depth += 1;
            cur = parents.get(&pid).copied().flatten();
            if depth > MAX_DEPTH {
                break; // cycle guard
            }
        }
        depth_map.insert(t.id, depth);
    }
    depth_map
}

/// Make each selected task a child of the row directly above it.
///
/// The first row has nothing above it and is left alone, as are ids that
/// are not in the list and tasks whose row above is one of their own
/// descendants. Returns how many tasks changed parent.
pub fn indent(tasks: &mut [Task], selected: &[u64]) -> usize {
    let mut changed = 0;
    for &id in selected {
        let Some(pos) = tasks.iter().position(|t| t.id == id) else {
            continue;
        };
        if pos == 0 {
            continue;
        }
        let above = tasks[pos - 1].id;
        if would_create_cycle(tasks, id, above) {
            warn!(task = id, above, "not indenting under a descendant");
            continue;
        }
        if tasks[pos].parent_id != Some(above) {
            tasks[pos].parent_id = Some(above);
            changed += 1;
        }
    }
    changed
}

/// Promote each selected task one level, to its parent's parent.
///
/// Parents are read as they stand at the moment each task is visited, so
/// outdenting a parent and its child together moves both up one level
/// relative to the new structure. A parent id that no longer resolves makes
/// the task a root. Returns how many tasks changed parent.
pub fn outdent(tasks: &mut [Task], selected: &[u64]) -> usize {
    let mut changed = 0;
    for &id in selected {
        let Some(pos) = tasks.iter().position(|t| t.id == id) else {
            continue;
        };
        let Some(parent) = tasks[pos].parent_id else {
            continue;
        };
        let grandparent = tasks
            .iter()
            .find(|t| t.id == parent)
            .and_then(|p| p.parent_id);
        tasks[pos].parent_id = grandparent;
        changed += 1;
    }
    changed
}

/// Move a task to `index` in display order, clamping past-the-end indices.
pub fn move_task(tasks: &mut Vec<Task>, id: u64, index: usize) -> Result<()> {
    let from = tasks
        .iter()
        .position(|t| t.id == id)
        .ok_or(Error::TaskNotFound(id))?;
    let task = tasks.remove(from);
    let to = index.min(tasks.len());
    tasks.insert(to, task);
    Ok(())
}
