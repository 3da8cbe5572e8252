//! Property tests for the dependency graph validator (§8: DAG-acyclic
//! property, invariant I1), grounded on the teacher's
//! `property_dependency_resolver.rs`.

use conclave_core::domain::error::PlanError;
use conclave_core::domain::models::PlanTask;
use conclave_core::services::dag_validator;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{HashMap, HashSet};

fn task(id: &str, depends_on: Vec<String>) -> PlanTask {
    PlanTask {
        task_id: id.to_string(),
        description: format!("task {id}"),
        required_role: "generalist".to_string(),
        parallel_group: 1,
        depends_on,
        acceptance_criteria: vec![],
    }
}

proptest! {
    /// Property: a plan built so every task only depends on earlier-indexed
    /// tasks is always acyclic by construction, and `validate` agrees.
    #[test]
    fn prop_forward_only_dependencies_are_always_acyclic(size in 1usize..30) {
        let ids: Vec<String> = (0..size).map(|i| format!("T{i}")).collect();
        let mut tasks = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            let deps = if i > 0 && i % 2 == 0 { vec![ids[i - 1].clone()] } else { vec![] };
            tasks.push(task(id, deps));
        }

        let order = dag_validator::validate(&tasks).map_err(|e| TestCaseError::fail(e.to_string()))?;

        let position: HashMap<&str, usize> = order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for t in &tasks {
            for dep in &t.depends_on {
                let dep_pos = position[dep.as_str()];
                let task_pos = position[t.task_id.as_str()];
                prop_assert!(dep_pos < task_pos, "dependency {} must precede {}", dep, t.task_id);
            }
        }
    }

    /// Property: the topological order never loses or duplicates a task.
    #[test]
    fn prop_validate_preserves_every_task_id(size in 1usize..30) {
        let ids: Vec<String> = (0..size).map(|i| format!("T{i}")).collect();
        let tasks: Vec<PlanTask> = ids.iter().enumerate()
            .map(|(i, id)| task(id, if i > 0 { vec![ids[i - 1].clone()] } else { vec![] }))
            .collect();

        let order = dag_validator::validate(&tasks).map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(order.len(), tasks.len());
        let input_ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let output_ids: HashSet<&str> = order.iter().map(String::as_str).collect();
        prop_assert_eq!(input_ids, output_ids);
    }

    /// Property: closing a forward chain into a ring always yields
    /// `PlanError::CycleDetected`, regardless of chain length.
    #[test]
    fn prop_closing_a_chain_into_a_ring_is_always_a_cycle(size in 2usize..20) {
        let ids: Vec<String> = (0..size).map(|i| format!("T{i}")).collect();
        let mut tasks: Vec<PlanTask> = ids.iter().enumerate()
            .map(|(i, id)| task(id, if i > 0 { vec![ids[i - 1].clone()] } else { vec![] }))
            .collect();
        // Close the chain: the first task now also depends on the last.
        tasks[0].depends_on.push(ids[size - 1].clone());

        prop_assert!(matches!(dag_validator::validate(&tasks), Err(PlanError::CycleDetected)));
    }

    /// Property: independent tasks (no edges at all) are always acyclic and
    /// all present in the output, in whatever order `validate` picks.
    #[test]
    fn prop_independent_tasks_are_all_present(size in 1usize..30) {
        let ids: Vec<String> = (0..size).map(|i| format!("T{i}")).collect();
        let tasks: Vec<PlanTask> = ids.iter().map(|id| task(id, vec![])).collect();

        let order = dag_validator::validate(&tasks).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(order.len(), size);
        let output_ids: HashSet<&str> = order.iter().map(String::as_str).collect();
        let input_ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        prop_assert_eq!(output_ids, input_ids);
    }
}
