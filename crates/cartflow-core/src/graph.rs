//! Directed task graph and a runner that executes it level by level.
//!
//! Nodes are named stages; an edge `a -> b` means `a` must complete before `b`
//! starts. The runner layers the graph topologically and treats every layer as
//! a barrier: all tasks of a layer run concurrently and the next layer starts
//! only after each of them finished successfully.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::RetryPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("task '{0}' is already defined")]
    DuplicateTask(String),
    #[error("task id {0} does not exist in this graph")]
    UnknownTask(usize),
    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(String),
    #[error("dependency cycle among tasks {0:?}")]
    Cycle(Vec<String>),
}

/// One unit of pipeline work. The returned string is a short summary for the
/// run report.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn run(&self) -> anyhow::Result<String>;
}

/// Adapts an async closure into a [`Stage`].
pub struct FnStage<F>(F);

pub fn stage_fn<F, Fut>(f: F) -> FnStage<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send,
{
    FnStage(f)
}

#[async_trait]
impl<F, Fut> Stage for FnStage<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send,
{
    async fn run(&self) -> anyhow::Result<String> {
        (self.0)().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

struct TaskNode {
    name: String,
    stage: Arc<dyn Stage>,
    dependencies: Vec<TaskId>,
}

#[derive(Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    by_name: HashMap<String, TaskId>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_task<S>(&mut self, name: impl Into<String>, stage: S) -> Result<TaskId, GraphError>
    where
        S: Stage + 'static,
    {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(GraphError::DuplicateTask(name));
        }
        let id = TaskId(self.nodes.len());
        self.by_name.insert(name.clone(), id);
        self.nodes.push(TaskNode {
            name,
            stage: Arc::new(stage),
            dependencies: Vec::new(),
        });
        Ok(id)
    }

    /// Declares that `before` must complete before `after` starts.
    pub fn add_dependency(&mut self, before: TaskId, after: TaskId) -> Result<(), GraphError> {
        self.check(before)?;
        self.check(after)?;
        if before == after {
            return Err(GraphError::SelfDependency(self.nodes[before.0].name.clone()));
        }
        let deps = &mut self.nodes[after.0].dependencies;
        if !deps.contains(&before) {
            deps.push(before);
        }
        Ok(())
    }

    /// `before` must complete before every task in `after`.
    pub fn fan_out(&mut self, before: TaskId, after: &[TaskId]) -> Result<(), GraphError> {
        after
            .iter()
            .try_for_each(|&task| self.add_dependency(before, task))
    }

    /// Every task in `before` must complete before `after`.
    pub fn fan_in(&mut self, before: &[TaskId], after: TaskId) -> Result<(), GraphError> {
        before
            .iter()
            .try_for_each(|&task| self.add_dependency(task, after))
    }

    pub fn task_id(&self, name: &str) -> Option<TaskId> {
        self.by_name.get(name).copied()
    }

    pub fn task_name(&self, id: TaskId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn dependencies(&self, id: TaskId) -> Vec<&str> {
        self.nodes[id.0]
            .dependencies
            .iter()
            .map(|dep| self.task_name(*dep))
            .collect()
    }

    /// Kahn layering. Tasks within a layer keep insertion order.
    pub fn levels(&self) -> Result<Vec<Vec<TaskId>>, GraphError> {
        let mut remaining: Vec<usize> = self
            .nodes
            .iter()
            .map(|node| node.dependencies.len())
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                dependents[dep.0].push(idx);
            }
        }

        let mut ready: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&idx| remaining[idx] == 0)
            .collect();
        let mut levels = Vec::new();
        let mut placed = 0;

        while !ready.is_empty() {
            let mut level: Vec<usize> = ready.drain(..).collect();
            level.sort_unstable();
            placed += level.len();

            for &idx in &level {
                for &next in &dependents[idx] {
                    remaining[next] -= 1;
                    if remaining[next] == 0 {
                        ready.push_back(next);
                    }
                }
            }
            levels.push(level.into_iter().map(TaskId).collect());
        }

        if placed != self.nodes.len() {
            let stuck = remaining
                .iter()
                .enumerate()
                .filter(|&(_, &count)| count > 0)
                .map(|(idx, _)| self.nodes[idx].name.clone())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        Ok(levels)
    }

    fn check(&self, id: TaskId) -> Result<(), GraphError> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownTask(id.0))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded { summary: String },
    Failed { error: String },
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub name: String,
    pub level: usize,
    pub attempts: u32,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks: Vec<TaskRecord>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| matches!(task.status, TaskStatus::Succeeded { .. }))
    }

    pub fn failed_tasks(&self) -> Vec<&TaskRecord> {
        self.tasks
            .iter()
            .filter(|task| matches!(task.status, TaskStatus::Failed { .. }))
            .collect()
    }

    pub fn task(&self, name: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|task| task.name == name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphRunner {
    retry: RetryPolicy,
}

impl GraphRunner {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub async fn run(&self, graph: &TaskGraph) -> Result<RunReport, GraphError> {
        let levels = graph.levels()?;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("pipeline_run", %run_id);

        let tasks = async {
            info!(tasks = graph.len(), levels = levels.len(), "run started");
            let mut records = Vec::with_capacity(graph.len());
            let mut halted = false;

            for (level_idx, level) in levels.iter().enumerate() {
                if halted {
                    for &id in level {
                        warn!(task = graph.task_name(id), "skipped after upstream failure");
                        records.push(TaskRecord {
                            name: graph.task_name(id).to_string(),
                            level: level_idx,
                            attempts: 0,
                            status: TaskStatus::Skipped,
                        });
                    }
                    continue;
                }

                let results =
                    join_all(level.iter().map(|&id| self.run_task(graph, id, level_idx))).await;
                halted = results
                    .iter()
                    .any(|record| matches!(record.status, TaskStatus::Failed { .. }));
                records.extend(results);
            }
            records
        }
        .instrument(span)
        .await;

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            tasks,
        })
    }

    async fn run_task(&self, graph: &TaskGraph, id: TaskId, level: usize) -> TaskRecord {
        let node = &graph.nodes[id.0];
        let attempts = self.retry.attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            info!(task = %node.name, attempt, "task started");
            match node.stage.run().await {
                Ok(summary) => {
                    info!(task = %node.name, attempt, summary = %summary, "task succeeded");
                    return TaskRecord {
                        name: node.name.clone(),
                        level,
                        attempts: attempt,
                        status: TaskStatus::Succeeded { summary },
                    };
                }
                Err(err) => {
                    last_error = format!("{err:#}");
                    if attempt < attempts {
                        warn!(
                            task = %node.name,
                            attempt,
                            error = %last_error,
                            retry_in_secs = self.retry.delay().as_secs(),
                            "task failed; retrying"
                        );
                        tokio::time::sleep(self.retry.delay()).await;
                    }
                }
            }
        }

        error!(task = %node.name, attempts, error = %last_error, "task failed");
        TaskRecord {
            name: node.name.clone(),
            level,
            attempts,
            status: TaskStatus::Failed { error: last_error },
        }
    }
}
