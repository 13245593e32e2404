//! Task definitions.

use std::fmt;
use std::sync::Arc;

/// Error returned by a failing task action.
pub type TaskFailure = Box<dyn std::error::Error + Send + Sync>;

/// The unit of work a task performs.
///
/// Actions are blocking: they are run on tokio's blocking pool.
pub type TaskAction = Arc<dyn Fn() -> Result<(), TaskFailure> + Send + Sync>;

/// A named unit of work.
#[derive(Clone)]
pub struct Task {
    name: String,
    deps: Vec<String>,
    after: Vec<String>,
    description: Option<String>,
    action: Option<TaskAction>,
}

impl Task {
    /// Create a task with no dependencies and no action.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deps: Vec::new(),
            after: Vec::new(),
            description: None,
            action: None,
        }
    }

    /// Tasks that must complete before this one. They are pulled into any
    /// invocation that includes this task.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Tasks that must complete first *if* they are part of the same
    /// invocation. Unlike [`Task::depends_on`] these are never pulled in.
    pub fn runs_after<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(tasks.into_iter().map(Into::into));
        self
    }

    /// One-line summary shown by task listings.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Set the action performed by this task.
    pub fn run<F>(mut self, action: F) -> Self
    where
        F: Fn() -> Result<(), TaskFailure> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.deps
    }

    pub fn ordering(&self) -> &[String] {
        &self.after
    }

    pub fn summary(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn action(&self) -> Option<&TaskAction> {
        self.action.as_ref()
    }

    /// A task without an action only groups its dependencies.
    pub fn is_aggregate(&self) -> bool {
        self.action.is_none()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("after", &self.after)
            .field("description", &self.description)
            .field("action", &self.action.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
