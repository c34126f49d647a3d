//! Helmsman Orchestrator Library
//!
//! Resumable, confirmable deployment workflow engine: sequences
//! provisioning steps against a remote host, pauses for operator
//! confirmation, and streams progress to observers.

pub mod catalog;
pub mod channel;
pub mod context;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod locks;
pub mod logs;
pub mod models;
pub mod options;
pub mod publish;
pub mod steps;
pub mod store;

pub use engine::DeploymentEngine;
pub use errors::OrchestratorError;
