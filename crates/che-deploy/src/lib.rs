//! Eclipse Che deploy action.
//!
//! Deploys Eclipse Che on a minikube cluster inside a CI job and, in the post
//! step of the same job, collects the server logs as a workflow artifact.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use che_deploy::{start, Workflow};
//!
//! #[tokio::main]
//! async fn main() {
//!     let workflow = Arc::new(Workflow::from_env());
//!     let ok = start(workflow.clone(), workflow, None).await;
//!     std::process::exit(i32::from(!ok));
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]
// Allow async functions that don't use await (trait seams)
#![allow(clippy::unused_async)]

pub mod artifact;
pub mod bindings;
pub mod che;
pub mod chectl;
pub mod cluster;
pub mod config;
pub mod custom_resource;
pub mod dispatcher;
pub mod error;
pub mod install;
pub mod keycloak;
pub mod post_action;
pub mod process;
pub mod ui;
pub mod workflow;

#[cfg(test)]
mod test_utils;

pub use bindings::Bindings;
pub use config::Configuration;
pub use dispatcher::{dispatch, start, Dispatcher, Flow, Phase};
pub use error::DeployError;
pub use workflow::Workflow;
