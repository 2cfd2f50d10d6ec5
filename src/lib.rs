// SPDX-License-Identifier: MIT

//! agentic-rag: a self-correcting retrieval-augmented answer workflow

pub mod config;
pub mod error;
pub mod model;
pub mod server;
pub mod sources;
pub mod workflow;

pub use config::Settings;
pub use error::RagError;
pub use workflow::{RunOutcome, Termination, WorkflowManager};
