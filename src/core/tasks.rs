//! Named tasks with declared dependencies.
//!
//! Running a task first runs every transitive dependency, each exactly once,
//! in depth-first post-order following declaration order. A task without an
//! action is an alias for its dependencies.

use crate::utils::{KilnError, Logger, Result};
use futures::future::BoxFuture;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

pub type TaskAction = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Clone)]
pub struct Task {
    name: String,
    dependencies: Vec<String>,
    action: Option<TaskAction>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            action: None,
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.action = Some(Arc::new(move || -> BoxFuture<'static, Result<()>> { Box::pin(action()) }));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn is_alias(&self) -> bool {
        self.action.is_none()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("alias", &self.is_alias())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: HashMap<String, Task>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a task. Its dependencies do not need to exist yet.
    pub fn register(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(task.name()) {
            return Err(KilnError::DuplicateTask(task.name().to_string()));
        }
        self.tasks.insert(task.name().to_string(), task);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn task_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    fn get(&self, name: &str) -> Result<&Task> {
        self.tasks
            .get(name)
            .ok_or_else(|| KilnError::UnknownTask(name.to_string()))
    }

    /// Execution order for `name`: its dependencies, then itself
    pub fn plan(&self, name: &str) -> Result<Vec<String>> {
        self.check_acyclic(name)?;

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.visit(name, &mut visited, &mut order)?;
        Ok(order)
    }

    fn visit(&self, name: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) -> Result<()> {
        if !visited.insert(name.to_string()) {
            return Ok(());
        }

        let task = self.get(name)?;
        for dependency in task.dependencies() {
            self.visit(dependency, visited, order)?;
        }
        order.push(name.to_string());
        Ok(())
    }

    /// Build the subgraph reachable from `root` and reject cycles in it
    fn check_acyclic(&self, root: &str) -> Result<()> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        let mut stack = vec![self.get(root)?];

        nodes.insert(root, graph.add_node(root));
        while let Some(task) = stack.pop() {
            let task_idx = nodes[task.name()];
            for dependency in task.dependencies() {
                let dep_task = self.get(dependency)?;
                let dep_idx = match nodes.get(dependency.as_str()) {
                    Some(idx) => *idx,
                    None => {
                        let idx = graph.add_node(dep_task.name());
                        nodes.insert(dep_task.name(), idx);
                        stack.push(dep_task);
                        idx
                    }
                };
                graph.add_edge(dep_idx, task_idx, ());
            }
        }

        if is_cyclic_directed(&graph) {
            let culprit = match toposort(&graph, None) {
                Err(cycle) => graph[cycle.node_id()].to_string(),
                Ok(_) => root.to_string(),
            };
            return Err(KilnError::CycleDetected(culprit));
        }

        Ok(())
    }

    /// Run `name` and everything it depends on. Stops at the first failing
    /// task; tasks depending on it are not run. Returns the tasks that ran.
    pub async fn run(&self, name: &str) -> Result<Vec<String>> {
        let plan = self.plan(name)?;

        for task_name in &plan {
            let task = self.get(task_name)?;
            let start = Instant::now();
            Logger::task_start(task_name);

            if let Some(action) = &task.action {
                action().await.map_err(|source| KilnError::TaskFailed {
                    task: task_name.clone(),
                    source: Box::new(source),
                })?;
            }

            Logger::task_finished(task_name, start.elapsed());
        }

        Ok(plan)
    }
}
