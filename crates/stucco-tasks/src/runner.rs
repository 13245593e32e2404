//! Plan execution.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::graph::{GraphError, Plan};
use crate::task::TaskFailure;

/// Errors that abort an invocation.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Task '{task}' failed: {source}")]
    Failed {
        task: String,
        #[source]
        source: TaskFailure,
    },

    #[error("Task '{task}' panicked")]
    Panicked { task: String },

    #[error("Task runner interrupted: {0}")]
    Interrupted(String),
}

impl TaskError {
    /// Name of the task that failed, if the failure came from a task.
    pub fn task(&self) -> Option<&str> {
        match self {
            TaskError::Failed { task, .. } | TaskError::Panicked { task } => Some(task),
            _ => None,
        }
    }
}

/// Result of a successful invocation.
#[derive(Debug)]
pub struct RunReport {
    /// Tasks in completion order
    pub completed: Vec<String>,

    /// Wall time of the whole invocation in milliseconds
    pub duration_ms: u64,
}

enum Outcome {
    Done,
    Failed(TaskFailure),
    Panicked,
}

/// Execute a plan.
///
/// A task starts as soon as all of its predecessors have finished. On the first
/// failure no further task is started; tasks already running are awaited so no
/// write outlives the invocation, then the failure is returned.
pub async fn execute(plan: Plan) -> Result<RunReport, TaskError> {
    let start = Instant::now();
    let nodes = plan.nodes;

    let mut remaining: Vec<usize> = nodes.iter().map(|n| n.preds.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for &pred in &node.preds {
            dependents[pred].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&i| remaining[i] == 0).collect();
    let mut running: JoinSet<(usize, Duration, Outcome)> = JoinSet::new();
    let mut completed = Vec::with_capacity(nodes.len());

    loop {
        while let Some(idx) = ready.pop_front() {
            let action = nodes[idx].action.clone();
            tracing::info!("Starting '{}'...", nodes[idx].name);

            running.spawn_blocking(move || {
                let started = Instant::now();
                let outcome = match action {
                    None => Outcome::Done,
                    Some(action) => match catch_unwind(AssertUnwindSafe(|| action())) {
                        Ok(Ok(())) => Outcome::Done,
                        Ok(Err(e)) => Outcome::Failed(e),
                        Err(_) => Outcome::Panicked,
                    },
                };
                (idx, started.elapsed(), outcome)
            });
        }

        let Some(joined) = running.join_next().await else {
            break;
        };

        let (idx, elapsed, outcome) = match joined {
            Ok(result) => result,
            Err(e) => {
                drain(&mut running).await;
                return Err(TaskError::Interrupted(e.to_string()));
            }
        };
        let name = &nodes[idx].name;

        match outcome {
            Outcome::Done => {
                tracing::info!("Finished '{}' after {} ms", name, elapsed.as_millis());
                completed.push(name.clone());
                for &d in &dependents[idx] {
                    remaining[d] -= 1;
                    if remaining[d] == 0 {
                        ready.push_back(d);
                    }
                }
            }
            Outcome::Failed(source) => {
                tracing::error!("'{}' errored after {} ms: {}", name, elapsed.as_millis(), source);
                drain(&mut running).await;
                return Err(TaskError::Failed {
                    task: name.clone(),
                    source,
                });
            }
            Outcome::Panicked => {
                tracing::error!("'{}' panicked after {} ms", name, elapsed.as_millis());
                drain(&mut running).await;
                return Err(TaskError::Panicked { task: name.clone() });
            }
        }
    }

    Ok(RunReport {
        completed,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Wait for in-flight tasks after a failure, discarding their results.
async fn drain(running: &mut JoinSet<(usize, Duration, Outcome)>) {
    while running.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier, Mutex};

    use pretty_assertions::assert_eq;

    use crate::graph::TaskGraph;
    use crate::task::Task;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging(name: &str, log: &Log) -> Task {
        let log = Arc::clone(log);
        let label = name.to_string();
        Task::new(name).run(move || {
            log.lock().unwrap().push(label.clone());
            Ok(())
        })
    }

    #[tokio::test]
    async fn runs_each_task_once_in_dependency_order() {
        let log: Log = Arc::default();
        let mut graph = TaskGraph::new();
        graph.register(logging("clean:scripts", &log)).unwrap();
        graph
            .register(logging("uglify", &log).depends_on(["clean:scripts"]))
            .unwrap();
        graph
            .register(logging("scripts", &log).depends_on(["clean:scripts", "uglify"]))
            .unwrap();
        graph
            .register(Task::new("build").depends_on(["scripts", "uglify"]))
            .unwrap();

        let report = graph.run(&["build"]).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["clean:scripts", "uglify", "scripts"]
        );
        assert_eq!(
            report.completed,
            vec!["clean:scripts", "uglify", "scripts", "build"]
        );
    }

    #[tokio::test]
    async fn failure_aborts_dependents() {
        let log: Log = Arc::default();
        let mut graph = TaskGraph::new();
        graph
            .register(Task::new("scripts").run(|| Err("include not found".into())))
            .unwrap();
        graph
            .register(logging("build", &log).depends_on(["scripts"]))
            .unwrap();

        let err = graph.run(&["build"]).await.unwrap_err();

        assert_eq!(err.task(), Some("scripts"));
        assert!(err.to_string().contains("include not found"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reports_panicking_task() {
        let mut graph = TaskGraph::new();
        graph
            .register(Task::new("images").run(|| panic!("decoder exploded")))
            .unwrap();

        let err = graph.run(&["images"]).await.unwrap_err();

        assert!(matches!(err, TaskError::Panicked { ref task } if task == "images"));
    }

    #[tokio::test]
    async fn unknown_task_is_a_graph_error() {
        let graph = TaskGraph::new();

        let err = graph.run(&["deploy"]).await.unwrap_err();

        assert!(matches!(err, TaskError::Graph(GraphError::UnknownTask(_))));
    }

    #[tokio::test]
    async fn siblings_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let mut graph = TaskGraph::new();
        for name in ["css", "images"] {
            let barrier = Arc::clone(&barrier);
            graph
                .register(Task::new(name).run(move || {
                    barrier.wait();
                    Ok(())
                }))
                .unwrap();
        }
        graph
            .register(Task::new("build").depends_on(["css", "images"]))
            .unwrap();

        let result =
            tokio::time::timeout(Duration::from_secs(5), graph.run(&["build"])).await;

        assert!(result.is_ok(), "sibling tasks were serialized");
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn after_edge_waits_for_clean() {
        let log: Log = Arc::default();
        let mut graph = TaskGraph::new();

        let slow_log = Arc::clone(&log);
        graph
            .register(Task::new("clean").run(move || {
                std::thread::sleep(Duration::from_millis(50));
                slow_log.lock().unwrap().push("clean".to_string());
                Ok(())
            }))
            .unwrap();
        graph
            .register(logging("css", &log).runs_after(["clean"]))
            .unwrap();
        graph
            .register(Task::new("build").depends_on(["clean", "css"]))
            .unwrap();

        graph.run(&["build"]).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["clean", "css"]);
    }
}
