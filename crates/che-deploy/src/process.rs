//! Subprocess execution.
//!
//! Every external CLI (the chectl installer, chectl itself, the post-action
//! script) goes through [`CommandRunner`] so flows can be exercised without
//! spawning anything.

use std::fmt;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::DeployError;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Forward stderr to ours instead of capturing it for error reports.
    pub forward_stderr: bool,
}

impl Invocation {
    /// Start an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            forward_stderr: false,
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Forward stderr as well as stdout when streaming.
    #[must_use]
    pub fn forward_stderr(mut self) -> Self {
        self.forward_stderr = true;
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs external programs to completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run while forwarding stdout (and stderr when requested) to ours.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits non-zero.
    async fn stream(&self, invocation: &Invocation) -> Result<()>;

    /// Run and return the captured stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits non-zero.
    async fn capture(&self, invocation: &Invocation) -> Result<String>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).stdin(Stdio::null());
        command
    }

    fn check(invocation: &Invocation, output: &std::process::Output) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }
        Err(DeployError::CommandFailed {
            program: invocation.program.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into())
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn stream(&self, invocation: &Invocation) -> Result<()> {
        debug!(command = %invocation, "Running");

        let stderr = if invocation.forward_stderr {
            Stdio::inherit()
        } else {
            Stdio::piped()
        };

        let child = Self::command(invocation)
            .stdout(Stdio::inherit())
            .stderr(stderr)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", invocation.program))?;

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for {}", invocation.program))?;

        Self::check(invocation, &output)
    }

    async fn capture(&self, invocation: &Invocation) -> Result<String> {
        debug!(command = %invocation, "Running");

        let output = Self::command(invocation)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", invocation.program))?;

        Self::check(invocation, &output)?;

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}
