//! Stage wrapper: a described unit of work with a sync or async body.

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::{BoxError, InputError};
use crate::reporter::{StagePhase, StageReporter};

/// A resolved stage output, type-erased so heterogeneous stages share one cache.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Pending result of a stage body.
pub type StageFuture<T> = BoxFuture<'static, Result<T, BoxError>>;

type Body<T> = Arc<dyn Fn(Inputs) -> StageFuture<T> + Send + Sync>;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Executor-scoped identity of a registered stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId {
    graph: u64,
    index: usize,
}

impl StageId {
    pub(crate) fn new(graph: u64, index: usize) -> Self {
        Self { graph, index }
    }

    pub(crate) fn graph(&self) -> u64 {
        self.graph
    }

    /// Registration position of the stage within its graph.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Typed handle returned by [`StageGraph::add_step`](crate::StageGraph::add_step).
///
/// Carries the output type of the stage so pipelines read naturally; the
/// graph itself only needs the [`StageId`].
pub struct StageHandle<T> {
    id: StageId,
    _output: PhantomData<fn() -> T>,
}

impl<T> StageHandle<T> {
    pub(crate) fn new(id: StageId) -> Self {
        Self {
            id,
            _output: PhantomData,
        }
    }

    /// Untyped identity, used when declaring dependencies.
    pub fn id(&self) -> StageId {
        self.id
    }
}

impl<T> Clone for StageHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StageHandle<T> {}

impl<T> fmt::Debug for StageHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHandle")
            .field("id", &self.id)
            .field("output", &type_name::<T>())
            .finish()
    }
}

impl<T> From<StageHandle<T>> for StageId {
    fn from(handle: StageHandle<T>) -> Self {
        handle.id
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Resolved dependency values handed to a stage body, in declared order.
#[derive(Clone, Default)]
pub struct Inputs {
    values: Vec<Value>,
}

impl Inputs {
    /// Build inputs from already-resolved values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Append a value; handy when calling a stage directly.
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.values.push(Arc::new(value));
        self
    }

    /// Borrow input `index` as a `T`.
    pub fn get<T: Any>(&self, index: usize) -> Result<&T, InputError> {
        self.value(index)?
            .downcast_ref::<T>()
            .ok_or(InputError::TypeMismatch {
                index,
                expected: type_name::<T>(),
            })
    }

    /// Clone input `index` out as a `T`.
    pub fn cloned<T: Any + Clone>(&self, index: usize) -> Result<T, InputError> {
        self.get::<T>(index).cloned()
    }

    /// The type-erased value at `index`.
    pub fn value(&self, index: usize) -> Result<&Value, InputError> {
        self.values.get(index).ok_or(InputError::Missing {
            index,
            len: self.values.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Inputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inputs")
            .field("len", &self.values.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A unit of work: optional description plus a body over resolved inputs.
///
/// A stage is a plain decorated function. Calling it with [`Stage::call`]
/// runs the body right away; only a [`StageGraph`](crate::StageGraph) adds
/// dependency resolution and memoization around it.
pub struct Stage<T> {
    description: Option<Cow<'static, str>>,
    body: Body<T>,
}

impl<T> Stage<T>
where
    T: Send + 'static,
{
    /// A stage with a synchronous body.
    pub fn new<F>(description: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: Fn(Inputs) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            description: Some(description.into()),
            body: sync_body(body),
        }
    }

    /// A stage whose body returns a pending computation.
    pub fn deferred<F, Fut>(description: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: Fn(Inputs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self {
            description: Some(description.into()),
            body: Arc::new(move |inputs| body(inputs).boxed()),
        }
    }

    /// A bare zero-argument function with no description.
    pub fn from_fn<F>(body: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            description: None,
            body: sync_body(move |_| Ok(body())),
        }
    }

    /// A stage that yields a clone of `value`.
    pub fn value(description: impl Into<Cow<'static, str>>, value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(description, move |_| Ok(value.clone()))
    }

    /// An undescribed stage that yields a clone of `value`.
    pub fn constant(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self {
            description: None,
            body: sync_body(move |_| Ok(value.clone())),
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Invoke the body directly with whatever inputs are supplied.
    ///
    /// A synchronous body runs before this returns; an asynchronous one
    /// returns its pending future.
    pub fn call(&self, inputs: Inputs) -> StageFuture<T> {
        (self.body)(inputs)
    }

    /// Invoke the body directly, reporting `Started` and `Finished`/`Failed`.
    pub async fn call_reported(
        &self,
        inputs: Inputs,
        reporter: &dyn StageReporter,
    ) -> Result<T, BoxError> {
        let description = self.description();
        reporter.stage(description, StagePhase::Started);
        let result = self.call(inputs).await;
        let phase = if result.is_ok() {
            StagePhase::Finished
        } else {
            StagePhase::Failed
        };
        reporter.stage(description, phase);
        result
    }

    pub(crate) fn into_erased(self) -> Stage<Value>
    where
        T: Sync,
    {
        let body = self.body;
        Stage {
            description: self.description,
            body: Arc::new(move |inputs| {
                body(inputs)
                    .map(|result| result.map(|value| Arc::new(value) as Value))
                    .boxed()
            }),
        }
    }

    pub(crate) fn body(&self) -> Body<T> {
        self.body.clone()
    }
}

impl<T> fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("description", &self.description)
            .field("output", &type_name::<T>())
            .finish()
    }
}

fn sync_body<T, F>(body: F) -> Body<T>
where
    T: Send + 'static,
    F: Fn(Inputs) -> Result<T, BoxError> + Send + Sync + 'static,
{
    Arc::new(move |inputs| futures::future::ready(body(inputs)).boxed())
}
