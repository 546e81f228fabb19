//! Core types, collaborator contracts and errors for the telemetry pipeline.
//!
//! The pipeline itself lives in the `worker` crate; everything it talks to
//! (connectors, the document store, the identity registry, the work queue)
//! is described here as a trait so adapters and test doubles can be swapped.

pub mod backend;
pub mod error;
pub mod identity;
pub mod item;
pub mod limits;
pub mod ocean;
pub mod outcome;
pub mod position;
pub mod queue;
pub mod registry;
pub mod store;

pub use backend::*;
pub use error::{Error, ErrorKind, Result};
pub use identity::*;
pub use item::*;
pub use ocean::*;
pub use outcome::*;
pub use position::*;
pub use queue::*;
pub use registry::*;
pub use store::*;
