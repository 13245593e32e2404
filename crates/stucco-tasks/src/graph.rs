//! Task registry and invocation planning.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::runner::{execute, RunReport, TaskError};
use crate::task::{Task, TaskAction};

/// Errors detected while registering or planning tasks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Task '{0}' is not registered")]
    UnknownTask(String),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task '{0}' is already registered")]
    Duplicate(String),

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// A set of named tasks.
#[derive(Debug, Default, Clone)]
pub struct TaskGraph {
    tasks: BTreeMap<String, Task>,
}

/// A task scheduled for one invocation.
#[derive(Clone)]
pub(crate) struct PlannedTask {
    pub name: String,
    pub action: Option<TaskAction>,
    /// Indexes of tasks that must finish first.
    pub preds: Vec<usize>,
}

/// The tasks of one invocation in a dependency-respecting order.
#[derive(Clone)]
pub struct Plan {
    pub(crate) nodes: Vec<PlannedTask>,
}

impl Plan {
    /// Task names in the order a serial execution would use.
    pub fn order(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.order()).finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Names must be unique.
    pub fn register(&mut self, task: Task) -> Result<(), GraphError> {
        if self.tasks.contains_key(task.name()) {
            return Err(GraphError::Duplicate(task.name().to_string()));
        }
        self.tasks.insert(task.name().to_string(), task);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// All tasks, sorted by name.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Plan an invocation of the given tasks.
    ///
    /// The plan contains the requested tasks and everything they depend on,
    /// each exactly once. `runs_after` edges order tasks that are both in the
    /// plan without pulling new tasks in.
    pub fn plan(&self, names: &[&str]) -> Result<Plan, GraphError> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut closure: Vec<&str> = Vec::new();

        for name in names {
            if !self.tasks.contains_key(*name) {
                return Err(GraphError::UnknownTask(name.to_string()));
            }
            self.visit(name, &mut marks, &mut stack, &mut closure)?;
        }

        let position: HashMap<&str, usize> =
            closure.iter().enumerate().map(|(i, n)| (*n, i)).collect();

        // Predecessors per closure position, combining deps and in-plan `after` edges.
        let mut preds: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); closure.len()];
        for (i, name) in closure.iter().enumerate() {
            let task = &self.tasks[*name];
            for dep in task.dependencies().iter().chain(task.ordering()) {
                if let Some(&p) = position.get(dep.as_str()) {
                    preds[i].insert(p);
                }
            }
        }

        // Kahn's algorithm, always releasing the earliest closure position first
        // so the order stays close to declaration order.
        let mut remaining: Vec<usize> = preds.iter().map(BTreeSet::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); closure.len()];
        for (i, p) in preds.iter().enumerate() {
            for &pred in p {
                dependents[pred].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..closure.len()).filter(|&i| remaining[i] == 0).collect();
        let mut order: Vec<usize> = Vec::with_capacity(closure.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &d in &dependents[i] {
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if order.len() != closure.len() {
            let stuck = (0..closure.len())
                .filter(|i| remaining[*i] > 0)
                .map(|i| closure[i].to_string())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        let mut new_index = vec![0; closure.len()];
        for (new, &old) in order.iter().enumerate() {
            new_index[old] = new;
        }

        let nodes = order
            .iter()
            .map(|&old| {
                let task = &self.tasks[closure[old]];
                PlannedTask {
                    name: task.name().to_string(),
                    action: task.action().cloned(),
                    preds: preds[old].iter().map(|p| new_index[*p]).collect(),
                }
            })
            .collect();

        Ok(Plan { nodes })
    }

    /// Depth-first walk over `deps`, emitting tasks in post-order.
    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        closure: &mut Vec<&'a str>,
    ) -> Result<(), GraphError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(name.to_string());
                return Err(GraphError::Cycle(cycle));
            }
            None => {}
        }

        let task = &self.tasks[name];
        marks.insert(name, Mark::Visiting);
        stack.push(name);

        for dep in task.dependencies() {
            if !self.tasks.contains_key(dep) {
                return Err(GraphError::UnknownDependency {
                    task: name.to_string(),
                    dependency: dep.clone(),
                });
            }
            self.visit(dep, marks, stack, closure)?;
        }

        stack.pop();
        marks.insert(name, Mark::Done);
        closure.push(name);
        Ok(())
    }

    /// Plan and execute the given tasks.
    pub async fn run(&self, names: &[&str]) -> Result<RunReport, TaskError> {
        let plan = self.plan(names)?;
        execute(plan).await
    }
}
