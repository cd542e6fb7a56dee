//! Dependency graph between work records.
//!
//! Design:
//! - Forward edges: dependent -> prerequisites it waits for
//! - Reverse edges: prerequisite -> dependents waiting for it
//! - Invariant: both maps are kept in sync, and the graph stays acyclic
//!   (edges that would close a cycle are rejected on insertion)
//!
//! Edge lists keep insertion order so prerequisite outputs are merged in a
//! stable order for a given store.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::WorkId;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// dependent -> prerequisites
    prerequisites: HashMap<WorkId, Vec<WorkId>>,

    /// prerequisite -> dependents
    /// Enables O(1) lookup: "who is waiting for this record?"
    dependents: HashMap<WorkId, Vec<WorkId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge: `dependent` waits for `prerequisite`.
    ///
    /// Returns the cycle that the edge would close, leaving the graph
    /// untouched, or `None` once the edge has been added. Re-adding an
    /// existing edge is a no-op.
    pub fn add_dependency(&mut self, dependent: WorkId, prerequisite: WorkId) -> Option<Vec<WorkId>> {
        if let Some(cycle) = self.cycle_through(dependent, prerequisite) {
            return Some(cycle);
        }

        let prereqs = self.prerequisites.entry(dependent).or_default();
        if prereqs.contains(&prerequisite) {
            return None;
        }
        prereqs.push(prerequisite);
        self.dependents.entry(prerequisite).or_default().push(dependent);
        None
    }

    /// Remove an edge, keeping both directions in sync.
    pub fn remove_dependency(&mut self, dependent: WorkId, prerequisite: WorkId) {
        remove_from(&mut self.prerequisites, dependent, prerequisite);
        remove_from(&mut self.dependents, prerequisite, dependent);
    }

    /// Records waiting for `prerequisite` (direct edges only).
    pub fn dependents_of(&self, prerequisite: WorkId) -> Vec<WorkId> {
        self.dependents
            .get(&prerequisite)
            .cloned()
            .unwrap_or_default()
    }

    /// Records `dependent` waits for (direct edges only).
    pub fn prerequisites_of(&self, dependent: WorkId) -> Vec<WorkId> {
        self.prerequisites
            .get(&dependent)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_prerequisites(&self, dependent: WorkId) -> bool {
        self.prerequisites
            .get(&dependent)
            .is_some_and(|p| !p.is_empty())
    }

    /// The loop `dependent -> ... -> prerequisite -> dependent` that adding the
    /// edge would close, if any.
    ///
    /// A cycle exists when `prerequisite` is already reachable from
    /// `dependent` by following dependent edges.
    fn cycle_through(&self, dependent: WorkId, prerequisite: WorkId) -> Option<Vec<WorkId>> {
        if dependent == prerequisite {
            return Some(vec![dependent, dependent]);
        }

        let mut prev: HashMap<WorkId, WorkId> = HashMap::new();
        let mut seen: HashSet<WorkId> = HashSet::from([dependent]);
        let mut queue = VecDeque::from([dependent]);

        while let Some(node) = queue.pop_front() {
            for next in self.dependents.get(&node).into_iter().flatten().copied() {
                if !seen.insert(next) {
                    continue;
                }
                prev.insert(next, node);
                if next == prerequisite {
                    let mut path = vec![prerequisite];
                    let mut cur = prerequisite;
                    while let Some(&p) = prev.get(&cur) {
                        path.push(p);
                        cur = p;
                    }
                    path.reverse();
                    path.push(dependent);
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// Detect a cycle anywhere in the graph (three-colour iterative DFS).
    ///
    /// Insertion already rejects cycles, so this only fires on graphs built
    /// around `add_dependency`, e.g. when loading edges from elsewhere.
    pub fn detect_cycle(&self) -> Option<Vec<WorkId>> {
        let mut color: HashMap<WorkId, Color> = HashMap::new();
        let mut roots: Vec<WorkId> = self.dependents.keys().copied().collect();
        roots.sort();

        for root in roots {
            if color.contains_key(&root) {
                continue;
            }
            // (node, index of the next child to visit)
            let mut stack: Vec<(WorkId, usize)> = vec![(root, 0)];
            color.insert(root, Color::Gray);

            while let Some((node, idx)) = stack.last().copied() {
                let children = self.dependents.get(&node).map(Vec::as_slice).unwrap_or(&[]);
                if idx == children.len() {
                    color.insert(node, Color::Black);
                    stack.pop();
                    continue;
                }
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let child = children[idx];
                match color.get(&child) {
                    Some(Color::Gray) => {
                        let start = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                        let mut cycle: Vec<WorkId> = stack[start..].iter().map(|(n, _)| *n).collect();
                        cycle.push(child);
                        return Some(cycle);
                    }
                    Some(Color::Black) => {}
                    None => {
                        color.insert(child, Color::Gray);
                        stack.push((child, 0));
                    }
                }
            }
        }
        None
    }

    /// Insert an edge without the cycle check.
    #[cfg(test)]
    fn force_dependency(&mut self, dependent: WorkId, prerequisite: WorkId) {
        self.prerequisites.entry(dependent).or_default().push(prerequisite);
        self.dependents.entry(prerequisite).or_default().push(dependent);
    }
}

fn remove_from(map: &mut HashMap<WorkId, Vec<WorkId>>, key: WorkId, value: WorkId) {
    if let Entry::Occupied(mut e) = map.entry(key) {
        e.get_mut().retain(|v| *v != value);
        if e.get().is_empty() {
            e.remove_entry();
        }
    }
}
