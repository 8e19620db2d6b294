pub mod backup;
pub mod config;
pub mod docker;
pub mod endpoint_cell;
pub mod error;
pub mod gate;
pub mod instance;
pub mod io;
pub mod metrics;
pub mod orchestrator;
pub mod probe;
pub mod runtime;
pub mod traefik;

#[cfg(test)]
mod testing;

pub use endpoint_cell::EndpointCell;
pub use error::{LoopError, Result};
pub use instance::{Endpoint, Instance};
pub use orchestrator::{Collaborators, CycleOutcome, Orchestrator};
