use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{EngineError, Result};
use crate::models::{Priority, TaskId};

/// Pure graph algorithms over a task dependency edge list
/// (`task_id -> depends_on`). Kept free of any store or I/O dependency
/// so it can be unit-tested directly and shared by both
/// `database::SqliteStore` (as a pre-write guard, duplicating the
/// equivalent recursive-CTE check done in SQL) and
/// `mocks::InMemoryStore`.
pub struct Resolver;

impl Resolver {
    /// Whether adding the edge `task_id -> depends_on` to `edges`
    /// would create a cycle. `edges` must not already contain the
    /// candidate edge.
    ///
    /// Implemented as a reachability search from `depends_on`: if
    /// `task_id` is reachable from `depends_on` via existing edges,
    /// the new edge would close a cycle back to `task_id`.
    pub fn would_cycle(edges: &HashMap<TaskId, Vec<TaskId>>, task_id: &TaskId, depends_on: &TaskId) -> bool {
        if task_id == depends_on {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(depends_on.clone());

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if &current == task_id {
                return true;
            }
            if let Some(next) = edges.get(&current) {
                for n in next {
                    queue.push_back(n.clone());
                }
            }
        }

        false
    }

    /// Validate a candidate edge, returning a human-readable cycle
    /// path in the error if it would close one.
    pub fn check_edge(
        edges: &HashMap<TaskId, Vec<TaskId>>,
        task_id: &TaskId,
        depends_on: &TaskId,
    ) -> Result<()> {
        if Self::would_cycle(edges, task_id, depends_on) {
            return Err(EngineError::cycle(format!(
                "{task_id} -> {depends_on} would close a dependency cycle"
            )));
        }
        Ok(())
    }

    /// Whether a task is blocked: true if any id in `depends_on` is
    /// not present in `completed`.
    pub fn is_blocked(depends_on: &[TaskId], completed: &HashSet<TaskId>) -> bool {
        depends_on.iter().any(|d| !completed.contains(d))
    }

    /// Given the id of a task that just completed and the full reverse
    /// edge map (`depends_on -> [task_ids that depend on it]`) plus the
    /// current set of each candidate's remaining dependencies, compute
    /// the set of tasks that become unblocked as a direct result.
    ///
    /// `remaining_deps` must reflect dependency state *before*
    /// `completed_id` is marked done; this function does not mutate
    /// its inputs.
    pub fn cascading_unblock(
        completed_id: &TaskId,
        reverse_edges: &HashMap<TaskId, Vec<TaskId>>,
        remaining_deps: &HashMap<TaskId, Vec<TaskId>>,
    ) -> Vec<TaskId> {
        let mut unblocked = Vec::new();

        let Some(dependents) = reverse_edges.get(completed_id) else {
            return unblocked;
        };

        for dependent in dependents {
            let Some(deps) = remaining_deps.get(dependent) else {
                continue;
            };
            let still_blocked = deps.iter().any(|d| d != completed_id);
            if !still_blocked {
                unblocked.push(dependent.clone());
            }
        }

        unblocked
    }

    /// Find the longest-weight chain of dependencies through the
    /// graph: the sequence of tasks that must run one after another
    /// and so bounds how quickly the whole set can finish.
    ///
    /// `edges` maps a task to the tasks it depends on (must be
    /// acyclic; the store and `would_cycle` guard against cycles
    /// before they ever reach here). A task's weight is its entry in
    /// `weights` (`estimated_hours`), defaulting to `1.0` when absent.
    /// When two chains tie on total weight, the one whose final task
    /// has higher priority wins; a further tie is broken by the lower
    /// task id, so the result is deterministic.
    ///
    /// Returns the path ordered from the earliest prerequisite to the
    /// final task; an empty graph yields an empty path.
    pub fn critical_path(
        edges: &HashMap<TaskId, Vec<TaskId>>,
        weights: &HashMap<TaskId, f64>,
        priorities: &HashMap<TaskId, Priority>,
    ) -> Vec<TaskId> {
        let mut tasks: HashSet<TaskId> = HashSet::new();
        for (task, deps) in edges {
            tasks.insert(task.clone());
            for d in deps {
                tasks.insert(d.clone());
            }
        }

        let mut memo: HashMap<TaskId, (f64, Vec<TaskId>)> = HashMap::new();
        let mut best: Option<(f64, Vec<TaskId>)> = None;

        let mut ordered: Vec<TaskId> = tasks.into_iter().collect();
        ordered.sort();

        for task in &ordered {
            let candidate = longest_path_ending_at(task, edges, weights, priorities, &mut memo);
            best = Some(match best {
                None => candidate,
                Some(current) => pick_better(current, candidate, priorities),
            });
        }

        best.map(|(_, path)| path).unwrap_or_default()
    }
}

/// `longest_path_ending_at(task)` is the heaviest chain of
/// dependencies terminating at `task`, inclusive of `task` itself.
fn longest_path_ending_at(
    task: &TaskId,
    edges: &HashMap<TaskId, Vec<TaskId>>,
    weights: &HashMap<TaskId, f64>,
    priorities: &HashMap<TaskId, Priority>,
    memo: &mut HashMap<TaskId, (f64, Vec<TaskId>)>,
) -> (f64, Vec<TaskId>) {
    if let Some(cached) = memo.get(task) {
        return cached.clone();
    }

    let own_weight = weights.get(task).copied().unwrap_or(1.0);

    let best_prefix = edges.get(task).into_iter().flatten().fold(None, |acc, dep| {
        let candidate = longest_path_ending_at(dep, edges, weights, priorities, memo);
        Some(match acc {
            None => candidate,
            Some(current) => pick_better(current, candidate, priorities),
        })
    });

    let result = match best_prefix {
        None => (own_weight, vec![task.clone()]),
        Some((prefix_weight, mut prefix_path)) => {
            prefix_path.push(task.clone());
            (prefix_weight + own_weight, prefix_path)
        }
    };

    memo.insert(task.clone(), result.clone());
    result
}

/// Select the better of two candidate chains: higher total weight
/// wins; ties go to the chain whose final task has higher priority,
/// then to the chain whose final task has the lower id.
fn pick_better(
    a: (f64, Vec<TaskId>),
    b: (f64, Vec<TaskId>),
    priorities: &HashMap<TaskId, Priority>,
) -> (f64, Vec<TaskId>) {
    if (a.0 - b.0).abs() > f64::EPSILON {
        return if a.0 > b.0 { a } else { b };
    }

    let a_last = a.1.last();
    let b_last = b.1.last();
    let a_priority = a_last.and_then(|id| priorities.get(id)).copied().unwrap_or_default();
    let b_priority = b_last.and_then(|id| priorities.get(id)).copied().unwrap_or_default();

    if a_priority != b_priority {
        return if a_priority > b_priority { a } else { b };
    }

    match (a_last, b_last) {
        (Some(a_id), Some(b_id)) if a_id <= b_id => a,
        (Some(_), Some(_)) => b,
        _ => a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &str)]) -> HashMap<TaskId, Vec<TaskId>> {
        let mut map: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for (from, to) in pairs {
            map.entry(from.to_string()).or_default().push(to.to_string());
        }
        map
    }

    #[test]
    fn no_cycle_for_disjoint_edge() {
        let e = edges(&[("a", "b")]);
        assert!(!Resolver::would_cycle(&e, &"c".to_string(), &"d".to_string()));
    }

    #[test]
    fn direct_self_edge_is_a_cycle() {
        let e = edges(&[]);
        assert!(Resolver::would_cycle(&e, &"a".to_string(), &"a".to_string()));
    }

    #[test]
    fn transitive_cycle_is_detected() {
        // a -> b -> c, adding c -> a closes the loop.
        let e = edges(&[("a", "b"), ("b", "c")]);
        assert!(Resolver::would_cycle(&e, &"c".to_string(), &"a".to_string()));
    }

    #[test]
    fn non_cyclical_edge_is_allowed() {
        let e = edges(&[("a", "b"), ("b", "c")]);
        assert!(!Resolver::would_cycle(&e, &"d".to_string(), &"a".to_string()));
    }

    #[test]
    fn blocked_when_any_dependency_incomplete() {
        let completed: HashSet<TaskId> = ["x".to_string()].into_iter().collect();
        assert!(Resolver::is_blocked(&["x".to_string(), "y".to_string()], &completed));
        assert!(!Resolver::is_blocked(&["x".to_string()], &completed));
        assert!(!Resolver::is_blocked(&[], &completed));
    }

    #[test]
    fn cascading_unblock_only_releases_fully_satisfied_dependents() {
        let reverse = edges(&[("done", "a"), ("done", "b")]);
        let mut remaining: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        remaining.insert("a".to_string(), vec!["done".to_string()]);
        remaining.insert("b".to_string(), vec!["done".to_string(), "other".to_string()]);

        let unblocked = Resolver::cascading_unblock(&"done".to_string(), &reverse, &remaining);
        assert_eq!(unblocked, vec!["a".to_string()]);
    }

    #[test]
    fn critical_path_follows_the_heaviest_chain() {
        // c -> b -> a (c depends on b, b depends on a); a separate
        // lighter branch d -> a should lose to the b -> c chain.
        let e = edges(&[("b", "a"), ("c", "b"), ("d", "a")]);
        let weights: HashMap<TaskId, f64> = [
            ("a".to_string(), 2.0),
            ("b".to_string(), 5.0),
            ("c".to_string(), 1.0),
            ("d".to_string(), 1.0),
        ]
        .into_iter()
        .collect();
        let priorities = HashMap::new();

        let path = Resolver::critical_path(&e, &weights, &priorities);
        assert_eq!(path, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn critical_path_defaults_missing_weight_to_one() {
        let e = edges(&[("b", "a")]);
        let path = Resolver::critical_path(&e, &HashMap::new(), &HashMap::new());
        assert_eq!(path, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn critical_path_breaks_ties_by_priority_then_id() {
        // Two disjoint single-node chains tie on weight; "high"
        // priority should win over the alphabetically earlier id.
        let e: HashMap<TaskId, Vec<TaskId>> = [("a".to_string(), vec![]), ("z".to_string(), vec![])]
            .into_iter()
            .collect();
        let weights: HashMap<TaskId, f64> =
            [("a".to_string(), 1.0), ("z".to_string(), 1.0)].into_iter().collect();
        let priorities: HashMap<TaskId, Priority> =
            [("a".to_string(), Priority::Low), ("z".to_string(), Priority::High)].into_iter().collect();

        let path = Resolver::critical_path(&e, &weights, &priorities);
        assert_eq!(path, vec!["z".to_string()]);
    }

    #[test]
    fn critical_path_on_empty_graph_is_empty() {
        assert!(Resolver::critical_path(&HashMap::new(), &HashMap::new(), &HashMap::new()).is_empty());
    }
}
