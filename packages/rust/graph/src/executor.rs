//! Stage graph executor: registration-ordered stages, memoized concurrent resolution.

use std::any::{Any, type_name};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, try_join_all};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::error::{ConfigurationError, GraphError, StageExecutionError, StagePanic};
use crate::reporter::{SilentReporter, StagePhase, StageReporter};
use crate::stage::{Inputs, Stage, StageHandle, StageId, Value};

/// Source of per-graph identities, so handles from one graph are rejected by another.
static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

type Outcome = Result<Value, StageExecutionError>;

/// A registered stage with its declared dependencies and write-once result slot.
struct Node {
    id: StageId,
    stage: Stage<Value>,
    dependencies: Vec<usize>,
    slot: OnceCell<Outcome>,
}

/// Shared state of one resolution pass.
struct Resolution {
    nodes: Vec<Node>,
    reporter: Arc<dyn StageReporter>,
}

/// An in-process, build-once-run-once dependency graph of [`Stage`]s.
///
/// Stages may only depend on stages registered earlier, which keeps the graph
/// acyclic without any cycle detection. [`process`](Self::process) resolves
/// the most recently registered stage; every other stage runs only if it is
/// reachable from it, and at most once.
pub struct StageGraph {
    id: u64,
    nodes: Vec<Node>,
    reporter: Arc<dyn StageReporter>,
}

impl StageGraph {
    /// Create an empty graph with no progress reporting.
    pub fn new() -> Self {
        Self::with_reporter(Arc::new(SilentReporter))
    }

    /// Create an empty graph that reports stage phases to `reporter`.
    pub fn with_reporter(reporter: Arc<dyn StageReporter>) -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            reporter,
        }
    }

    /// Register `stage`, depending on `dependencies` in the given order.
    ///
    /// Every dependency must already be registered in this graph.
    pub fn add_step<T>(
        &mut self,
        stage: Stage<T>,
        dependencies: &[StageId],
    ) -> Result<StageHandle<T>, ConfigurationError>
    where
        T: Send + Sync + 'static,
    {
        let mut resolved = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            if dependency.graph() != self.id || dependency.index() >= self.nodes.len() {
                return Err(ConfigurationError::UnknownDependency {
                    dependency: *dependency,
                });
            }
            resolved.push(dependency.index());
        }

        let id = StageId::new(self.id, self.nodes.len());
        debug!(
            stage = %id,
            description = stage.description().unwrap_or("unnamed"),
            dependencies = ?resolved,
            "stage registered"
        );

        self.nodes.push(Node {
            id,
            stage: stage.into_erased(),
            dependencies: resolved,
            slot: OnceCell::new(),
        });

        Ok(StageHandle::new(id))
    }

    /// Number of registered stages.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The stage `process()` will resolve: the last one registered.
    pub fn terminal(&self) -> Option<StageId> {
        self.nodes.last().map(|node| node.id)
    }

    /// Resolve the terminal stage and return its value.
    ///
    /// Fails with the first stage failure encountered; no partial result is
    /// returned. Consumes the graph: a new graph is built per job.
    #[instrument(name = "graph_process", skip_all, fields(graph = self.id, stages = self.nodes.len()))]
    pub async fn process(self) -> Result<Value, GraphError> {
        let Some(terminal) = self.nodes.len().checked_sub(1) else {
            return Err(ConfigurationError::Empty.into());
        };

        let resolution = Arc::new(Resolution {
            nodes: self.nodes,
            reporter: self.reporter,
        });

        match resolve(resolution, terminal).await {
            Ok(value) => {
                debug!("graph resolved");
                Ok(value)
            }
            Err(e) => {
                warn!(stage = %e.stage, error = %e, "graph resolution failed");
                Err(e.into())
            }
        }
    }

    /// Resolve the terminal stage and downcast its value to `T`.
    pub async fn process_as<T>(self) -> Result<Arc<T>, GraphError>
    where
        T: Any + Send + Sync,
    {
        self.process()
            .await?
            .downcast::<T>()
            .map_err(|_| GraphError::OutputType {
                expected: type_name::<T>(),
            })
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StageGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGraph")
            .field("id", &self.id)
            .field("stages", &self.nodes.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve stage `index`, claiming its slot or awaiting whoever claimed it first.
fn resolve(resolution: Arc<Resolution>, index: usize) -> BoxFuture<'static, Outcome> {
    Box::pin(async move {
        let node = &resolution.nodes[index];
        node.slot
            .get_or_init(|| run_stage(resolution.clone(), index))
            .await
            .clone()
    })
}

/// Resolve dependencies, then run the body once on its own task.
fn run_stage(resolution: Arc<Resolution>, index: usize) -> BoxFuture<'static, Outcome> {
    Box::pin(async move {
        let node = &resolution.nodes[index];

        // Pending
        let inputs: Vec<Value> = match try_join_all(
            node.dependencies
                .iter()
                .map(|&dependency| resolve(resolution.clone(), dependency)),
        )
        .await
        {
            Ok(values) => values,
            Err(e) => {
                debug!(stage = %node.id, failed = %e.stage, "dependency failed, stage skipped");
                return Err(e);
            }
        };

        // Running
        let description = node.stage.description().map(String::from);
        let reporter = resolution.reporter.clone();
        reporter.stage(description.as_deref(), StagePhase::Started);
        debug!(stage = %node.id, description = description.as_deref().unwrap_or("unnamed"), "stage started");

        let body = node.stage.body();
        // Spawned so a failure elsewhere never interrupts a body already running.
        let outcome = match tokio::spawn(async move { body(Inputs::new(inputs)).await }).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StageExecutionError::new(node.id, description.clone(), e)),
            Err(join_error) => {
                let message = panic_message(join_error);
                Err(StageExecutionError::new(
                    node.id,
                    description.clone(),
                    Box::new(StagePanic(message)),
                ))
            }
        };

        match &outcome {
            Ok(_) => {
                reporter.stage(description.as_deref(), StagePhase::Finished);
                debug!(stage = %node.id, "stage finished");
            }
            Err(e) => {
                reporter.stage(description.as_deref(), StagePhase::Failed);
                debug!(stage = %node.id, error = %e.cause(), "stage failed");
            }
        }

        outcome
    })
}

fn panic_message(error: tokio::task::JoinError) -> String {
    match error.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string()),
        Err(error) => error.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
