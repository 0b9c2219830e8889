//! cdist core: converges a target host onto the objects its manifests
//! declare.
//!
//! A run is driven by `orchestrator::ConfigInstall`. Objects live in a
//! `data::ObjectStore`; scripts are reached only through the traits in
//! `gateway`; `convergence` decides the order objects are prepared and run.

pub mod context;
pub mod convergence;
pub mod data;
pub mod emulator;
pub mod error;
pub mod gateway;
pub mod infrastructure;
pub mod lock;
pub mod orchestrator;
pub mod types;

pub use context::RunContext;
pub use convergence::{RunReport, Strategy};
pub use data::ObjectStore;
pub use error::{CdistError, Result};
pub use gateway::Gateways;
pub use orchestrator::ConfigInstall;
pub use types::{CdistObject, ObjectName, ObjectState, Settings};
