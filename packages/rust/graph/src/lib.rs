//! Dependency-driven stage graph for pagebinder pipelines.
//!
//! A pipeline is built by registering [`Stage`]s on a [`StageGraph`] in
//! dependency order, then resolved once with [`StageGraph::process`]:
//! - [`Stage`]: a unit of work with an optional description and a sync or async body
//! - [`StageGraph`]: memoized, concurrent resolution of the last registered stage
//! - [`StageReporter`]: optional progress hook invoked around each body
//!
//! ```no_run
//! use pagebinder_graph::{Stage, StageGraph};
//!
//! # async fn run() -> Result<(), pagebinder_graph::GraphError> {
//! let mut graph = StageGraph::new();
//! let a = graph.add_step(Stage::from_fn(|| 1_i32), &[])?;
//! let b = graph.add_step(Stage::from_fn(|| 2_i32), &[])?;
//! graph.add_step(
//!     Stage::new("Adding", |inputs| Ok(inputs.get::<i32>(0)? + inputs.get::<i32>(1)?)),
//!     &[a.id(), b.id()],
//! )?;
//!
//! let sum = graph.process_as::<i32>().await?;
//! assert_eq!(*sum, 3);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod executor;
pub mod reporter;
pub mod stage;

pub use error::{BoxError, ConfigurationError, GraphError, InputError, StageExecutionError};
pub use executor::StageGraph;
pub use reporter::{SilentReporter, StagePhase, StageReporter};
pub use stage::{Inputs, Stage, StageFuture, StageHandle, StageId, Value};
