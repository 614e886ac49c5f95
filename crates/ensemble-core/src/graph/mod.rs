//! Task graph construction and wave ordering.
//!
//! Dependencies are an explicit adjacency list of `task_id -> depends_on`,
//! validated by topological extraction (Kahn's algorithm). The output is a
//! sequence of "waves": batches in which every task's dependencies are
//! satisfied by strictly earlier batches. A wave is the unit of parallel
//! dispatch.

pub mod decompose;

use std::collections::HashSet;

use ensemble_state::{Project, Task, TaskId};

use crate::error::{GraphError, Result};

pub use decompose::{Decomposer, PlannerDecomposer, TemplateDecomposer};

/// Validate that `tasks` forms a DAG with fully resolved dependencies.
pub fn validate(tasks: &[Task]) -> std::result::Result<(), GraphError> {
    topological_waves(tasks).map(|_| ())
}

/// Group tasks into ordered waves.
///
/// Every task in a wave has all of its dependencies in strictly earlier
/// waves. Within a wave, order is stable by task creation order (input
/// order), so execution order is deterministic for a given graph.
///
/// Fails with [`GraphError::DanglingDependency`] when a dependency does not
/// resolve within `tasks`, and with [`GraphError::CycleDetected`] — naming
/// the offending cycle — when no progress can be made.
pub fn topological_waves(tasks: &[Task]) -> std::result::Result<Vec<Vec<TaskId>>, GraphError> {
    let known: HashSet<TaskId> = tasks.iter().map(|t| t.task_id).collect();
    for task in tasks {
        for dep in &task.depends_on {
            if !known.contains(dep) {
                return Err(GraphError::DanglingDependency {
                    task_id: task.task_id,
                    missing: *dep,
                });
            }
        }
    }

    // Kahn's algorithm, batched: repeatedly extract every task with zero
    // unresolved dependencies. Input order is preserved within a wave.
    let mut unresolved: Vec<(TaskId, Vec<TaskId>)> = tasks
        .iter()
        .map(|t| (t.task_id, t.depends_on.clone()))
        .collect();

    let mut waves = Vec::new();
    while !unresolved.is_empty() {
        let wave: Vec<TaskId> = unresolved
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| *id)
            .collect();

        if wave.is_empty() {
            return Err(GraphError::CycleDetected {
                cycle: find_cycle(&unresolved),
            });
        }

        let extracted: HashSet<TaskId> = wave.iter().copied().collect();
        unresolved.retain(|(id, _)| !extracted.contains(id));
        for (_, deps) in &mut unresolved {
            deps.retain(|d| !extracted.contains(d));
        }
        waves.push(wave);
    }

    Ok(waves)
}

/// Walk unresolved dependencies until a task repeats. Only called when every
/// remaining task has at least one unresolved dependency, so the walk always
/// closes a cycle.
fn find_cycle(unresolved: &[(TaskId, Vec<TaskId>)]) -> Vec<TaskId> {
    let dep_of = |id: &TaskId| -> TaskId {
        unresolved
            .iter()
            .find(|(tid, _)| tid == id)
            .and_then(|(_, deps)| deps.first().copied())
            .expect("every unresolved task has an unresolved dependency")
    };

    let mut path: Vec<TaskId> = Vec::new();
    let mut current = unresolved[0].0;
    loop {
        if let Some(pos) = path.iter().position(|id| *id == current) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(current);
            return cycle;
        }
        path.push(current);
        current = dep_of(&current);
    }
}

/// Decompose `request` into tasks, validate the combined project graph, and
/// append the new tasks to the project. Returns the ids of the new tasks.
///
/// The project is not mutated when validation fails, so a malformed
/// decomposition can never reach execution.
pub async fn build_graph(
    project: &mut Project,
    request: &str,
    decomposer: &dyn Decomposer,
) -> Result<Vec<TaskId>> {
    let new_tasks = decomposer.decompose(project, request).await?;
    if new_tasks.is_empty() {
        return Err(GraphError::EmptyDecomposition.into());
    }

    let mut combined = project.tasks.clone();
    combined.extend(new_tasks.iter().cloned());
    validate(&combined)?;

    let ids = new_tasks.iter().map(|t| t.task_id).collect();
    project.add_tasks(new_tasks);
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_state::WorkerRole;

    fn task(description: &str, deps: Vec<TaskId>) -> Task {
        Task::new(description, WorkerRole::General, deps)
    }

    #[test]
    fn test_independent_tasks_form_single_wave() {
        let tasks = vec![task("a", vec![]), task("b", vec![]), task("c", vec![])];
        let waves = topological_waves(&tasks).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].len(), 3);
        // Stable in creation order.
        assert_eq!(waves[0][0], tasks[0].task_id);
        assert_eq!(waves[0][2], tasks[2].task_id);
    }

    #[test]
    fn test_diamond_graph_waves() {
        let a = task("a", vec![]);
        let b = task("b", vec![a.task_id]);
        let c = task("c", vec![a.task_id]);
        let d = task("d", vec![b.task_id, c.task_id]);
        let tasks = vec![a.clone(), b.clone(), c.clone(), d.clone()];

        let waves = topological_waves(&tasks).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec![a.task_id]);
        assert_eq!(waves[1], vec![b.task_id, c.task_id]);
        assert_eq!(waves[2], vec![d.task_id]);
    }

    #[test]
    fn test_every_task_appears_in_exactly_one_wave() {
        let a = task("a", vec![]);
        let b = task("b", vec![a.task_id]);
        let c = task("c", vec![b.task_id]);
        let d = task("d", vec![]);
        let tasks = vec![a, b, c, d];

        let waves = topological_waves(&tasks).unwrap();
        let mut seen = HashSet::new();
        for wave in &waves {
            for id in wave {
                assert!(seen.insert(*id), "task appeared in two waves");
            }
        }
        assert_eq!(seen.len(), tasks.len());
    }

    #[test]
    fn test_dependencies_always_in_strictly_earlier_wave() {
        let a = task("a", vec![]);
        let b = task("b", vec![a.task_id]);
        let c = task("c", vec![a.task_id, b.task_id]);
        let tasks = vec![a, b, c];

        let waves = topological_waves(&tasks).unwrap();
        let wave_of = |id: &TaskId| waves.iter().position(|w| w.contains(id)).unwrap();
        for t in &tasks {
            for dep in &t.depends_on {
                assert!(wave_of(dep) < wave_of(&t.task_id));
            }
        }
    }

    #[test]
    fn test_cycle_is_detected_and_named() {
        let mut a = task("a", vec![]);
        let mut b = task("b", vec![]);
        a.depends_on = vec![b.task_id];
        b.depends_on = vec![a.task_id];
        let ids = [a.task_id, b.task_id];

        let err = topological_waves(&[a, b]).unwrap_err();
        match err {
            GraphError::CycleDetected { cycle } => {
                assert!(cycle.len() >= 3);
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.iter().all(|id| ids.contains(id)));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut a = task("a", vec![]);
        a.depends_on = vec![a.task_id];
        assert!(matches!(
            topological_waves(&[a]),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_dangling_dependency_is_rejected() {
        let ghost = TaskId::new();
        let a = task("a", vec![ghost]);
        let err = topological_waves(&[a.clone()]).unwrap_err();
        match err {
            GraphError::DanglingDependency { task_id, missing } => {
                assert_eq!(task_id, a.task_id);
                assert_eq!(missing, ghost);
            }
            other => panic!("expected DanglingDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_task_list_yields_no_waves() {
        let waves = topological_waves(&[]).unwrap();
        assert!(waves.is_empty());
    }
}
