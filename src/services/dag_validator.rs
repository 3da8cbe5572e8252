//! Dependency Graph Validator (§4.2.1): Kahn's-algorithm topological sort
//! over a decomposition plan's synthetic `depends_on` edges. Rejects cycles
//! (invariant I1) before a plan is ever persisted.

use std::collections::{HashMap, VecDeque};

use crate::domain::error::PlanError;
use crate::domain::models::PlanTask;

/// Runs Kahn's algorithm over `tasks`. Returns the tasks in a valid
/// topological order on success, or `PlanError::CycleDetected` /
/// `PlanError::UnknownTaskId` on failure.
///
/// Initialize in-degree per node from the `depends_on` lists; enqueue
/// zero-degree nodes; pop, increment `processed`, and decrement each
/// neighbor's in-degree, enqueuing any that hit zero. If `processed` ends up
/// less than the node count, a cycle exists.
pub fn validate(tasks: &[PlanTask]) -> Result<Vec<String>, PlanError> {
    let known_ids: std::collections::HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
    for task in tasks {
        for dep in &task.depends_on {
            if !known_ids.contains(dep.as_str()) {
                return Err(PlanError::UnknownTaskId(dep.clone()));
            }
        }
    }

    let mut in_degree: HashMap<&str, usize> = tasks.iter().map(|t| (t.task_id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        for dep in &task.depends_on {
            *in_degree.get_mut(task.task_id.as_str()).unwrap() += 1;
            dependents.entry(dep.as_str()).or_default().push(task.task_id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(tasks.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.to_string());
        if let Some(children) = dependents.get(node) {
            for child in children {
                let degree = in_degree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if order.len() < tasks.len() {
        return Err(PlanError::CycleDetected);
    }

    Ok(order)
}

pub fn is_acyclic(tasks: &[PlanTask]) -> bool {
    validate(tasks).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, depends_on: &[&str]) -> PlanTask {
        PlanTask {
            task_id: id.to_string(),
            description: String::new(),
            required_role: "generalist".to_string(),
            parallel_group: 1,
            depends_on: depends_on.iter().map(|s| (*s).to_string()).collect(),
            acceptance_criteria: vec![],
        }
    }

    #[test]
    fn linear_chain_sorts_in_order() {
        let tasks = vec![task("T1", &[]), task("T2", &["T1"]), task("T3", &["T2"])];
        let order = validate(&tasks).unwrap();
        assert_eq!(order, vec!["T1", "T2", "T3"]);
    }

    #[test]
    fn diamond_is_acyclic() {
        let tasks = vec![
            task("T1", &[]),
            task("T2", &["T1"]),
            task("T3", &["T1"]),
            task("T4", &["T2", "T3"]),
        ];
        assert!(is_acyclic(&tasks));
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let tasks = vec![task("T1", &["T2"]), task("T2", &["T1"])];
        assert!(matches!(validate(&tasks), Err(PlanError::CycleDetected)));
    }

    #[test]
    fn unknown_dependency_id_is_rejected() {
        let tasks = vec![task("T1", &["T99"])];
        assert!(matches!(validate(&tasks), Err(PlanError::UnknownTaskId(_))));
    }
}
