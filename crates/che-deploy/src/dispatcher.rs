//! Entry-point dispatch between the main and post invocations.
//!
//! The runner starts the same binary twice per job: once for the main step
//! and once as the post step. A flag in the runner state store tells the two
//! apart.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use tracing::{error, info};

use crate::bindings::Bindings;
use crate::config::Configuration;
use crate::workflow::{StateStore, WorkflowCommands};

/// State key set once the main phase has started.
pub const STATE_IS_POST: &str = "isPost";

/// Which half of the action run this invocation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Phase {
    /// Deploy Eclipse Che.
    Main,
    /// Collect and upload logs.
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// A unit of work run by one invocation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Flow: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Run to completion or first failure.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any step.
    async fn execute(&self) -> Result<()>;
}

/// Chooses and runs the flow for this invocation.
pub struct Dispatcher {
    state: Arc<dyn StateStore>,
    install: Arc<dyn Flow>,
    post: Arc<dyn Flow>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>, install: Arc<dyn Flow>, post: Arc<dyn Flow>) -> Self {
        Self {
            state,
            install,
            post,
        }
    }

    /// Phase recorded in the state store.
    #[must_use]
    pub fn current_phase(&self) -> Phase {
        if self.state.get_state(STATE_IS_POST).is_some() {
            Phase::Post
        } else {
            Phase::Main
        }
    }

    /// Run the flow for the phase recorded in the state store.
    ///
    /// The post flag is saved before the install flow starts, so the post
    /// invocation collects logs even when the deployment fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be saved or the flow fails.
    pub async fn run(&self) -> Result<Phase> {
        let phase = self.current_phase();
        if phase == Phase::Main {
            self.state.save_state(STATE_IS_POST, "true")?;
        }
        self.run_phase(phase).await?;
        Ok(phase)
    }

    /// Run the flow for `phase` without consulting or updating state.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow fails.
    pub async fn run_phase(&self, phase: Phase) -> Result<()> {
        let flow = match phase {
            Phase::Main => &self.install,
            Phase::Post => &self.post,
        };
        info!(%phase, flow = flow.name(), "Running flow");
        flow.execute().await
    }
}

/// Read configuration, wire the collaborators and run this invocation.
///
/// Never fails: errors are logged with their full chain and reported as
/// `false`.
pub async fn start(
    workflow: Arc<dyn WorkflowCommands>,
    state: Arc<dyn StateStore>,
    phase: Option<Phase>,
) -> bool {
    match Bindings::new(Configuration::from_env(), workflow, state) {
        Ok(bindings) => dispatch(&bindings.dispatcher(), phase).await,
        Err(e) => report(Err(e)),
    }
}

/// Run `phase`, or the phase recorded in state when none is forced, and
/// report the outcome.
pub async fn dispatch(dispatcher: &Dispatcher, phase: Option<Phase>) -> bool {
    let result = match phase {
        Some(phase) => dispatcher.run_phase(phase).await.map(|()| phase),
        None => dispatcher.run().await,
    };
    report(result)
}

/// Convert the outcome of a run into the boolean handed back to `main`.
pub fn report(result: Result<Phase>) -> bool {
    match result {
        Ok(phase) => {
            info!(%phase, "Completed");
            true
        }
        Err(e) => {
            error!("stack={e:?}");
            error!("Unable to start: {e}");
            false
        }
    }
}
