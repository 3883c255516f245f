//! GitHub Actions runner protocol.
//!
//! Outputs and state are handed to the runner through file commands (the
//! files named by `GITHUB_OUTPUT` and `GITHUB_STATE`). Secrets and errors are
//! workflow commands printed on stdout. State saved in the main invocation
//! comes back to the post invocation as `STATE_<key>` variables.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{debug, error};

const ENV_OUTPUT_FILE: &str = "GITHUB_OUTPUT";
const ENV_STATE_FILE: &str = "GITHUB_STATE";
const STATE_ENV_PREFIX: &str = "STATE_";

/// Cross-invocation key/value store.
#[cfg_attr(test, mockall::automock)]
pub trait StateStore: Send + Sync {
    /// Value saved under `key` by an earlier invocation, if any.
    fn get_state(&self, key: &str) -> Option<String>;

    /// Persist `value` under `key` for later invocations.
    ///
    /// # Errors
    ///
    /// Returns an error if the runner state file cannot be written.
    fn save_state(&self, key: &str, value: &str) -> Result<()>;
}

/// Commands the action sends to the runner.
#[cfg_attr(test, mockall::automock)]
pub trait WorkflowCommands: Send + Sync {
    /// Publish a step output.
    ///
    /// # Errors
    ///
    /// Returns an error if the runner output file cannot be written.
    fn set_output(&self, name: &str, value: &str) -> Result<()>;

    /// Register a value to be redacted from the job log.
    fn set_secret(&self, value: &str);

    /// Annotate the run with an error message.
    fn error(&self, message: &str);

    /// Annotate the run with an error and mark it failed.
    fn set_failed(&self, message: &str);
}

/// Escape command data the way the runner expects.
#[must_use]
pub fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escape a command property value.
#[must_use]
pub fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

/// Render a workflow command: `::command key=value::data`.
#[must_use]
pub fn command_line(command: &str, property: Option<(&str, &str)>, data: &str) -> String {
    let properties = property
        .map(|(k, v)| format!(" {k}={}", escape_property(v)))
        .unwrap_or_default();
    format!("::{command}{properties}::{}", escape_data(data))
}

/// Format a `key<<delimiter` block for a file command.
///
/// # Errors
///
/// Returns an error if the key or value contains the generated delimiter.
pub fn key_value_message(key: &str, value: &str) -> Result<String> {
    let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());

    if key.contains(&delimiter) {
        anyhow::bail!("Unexpected input: name should not contain the delimiter \"{delimiter}\"");
    }
    if value.contains(&delimiter) {
        anyhow::bail!("Unexpected input: value should not contain the delimiter \"{delimiter}\"");
    }

    Ok(format!("{key}<<{delimiter}\n{value}\n{delimiter}\n"))
}

/// Runner-backed implementation of [`StateStore`] and [`WorkflowCommands`].
#[derive(Debug, Default)]
pub struct Workflow {
    output_file: Option<PathBuf>,
    state_file: Option<PathBuf>,
    saved_state: HashMap<String, String>,
    failed: AtomicBool,
}

impl Workflow {
    /// Build from the variables the runner exports.
    #[must_use]
    pub fn from_env() -> Self {
        let file = |key: &str| {
            std::env::var_os(key)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        let saved_state = std::env::vars()
            .filter_map(|(k, v)| k.strip_prefix(STATE_ENV_PREFIX).map(|k| (k.to_string(), v)))
            .collect();

        Self {
            output_file: file(ENV_OUTPUT_FILE),
            state_file: file(ENV_STATE_FILE),
            saved_state,
            failed: AtomicBool::new(false),
        }
    }

    /// Build with explicit command files and previously saved state.
    #[must_use]
    pub fn new(
        output_file: Option<PathBuf>,
        state_file: Option<PathBuf>,
        saved_state: HashMap<String, String>,
    ) -> Self {
        Self {
            output_file,
            state_file,
            saved_state,
            failed: AtomicBool::new(false),
        }
    }

    /// Whether [`WorkflowCommands::set_failed`] was called.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn issue_file_command(path: &Path, key: &str, value: &str) -> Result<()> {
        let message = key_value_message(key, value)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(message.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn issue_command(command: &str, property: Option<(&str, &str)>, data: &str) {
        println!("{}", command_line(command, property, data));
    }
}

impl StateStore for Workflow {
    fn get_state(&self, key: &str) -> Option<String> {
        self.saved_state.get(key).filter(|v| !v.is_empty()).cloned()
    }

    fn save_state(&self, key: &str, value: &str) -> Result<()> {
        debug!(key, "Saving state");
        match &self.state_file {
            Some(path) => Self::issue_file_command(path, key, value),
            None => {
                Self::issue_command("save-state", Some(("name", key)), value);
                Ok(())
            }
        }
    }
}

impl WorkflowCommands for Workflow {
    fn set_output(&self, name: &str, value: &str) -> Result<()> {
        debug!(name, "Setting output");
        match &self.output_file {
            Some(path) => Self::issue_file_command(path, name, value),
            None => {
                Self::issue_command("set-output", Some(("name", name)), value);
                Ok(())
            }
        }
    }

    fn set_secret(&self, value: &str) {
        Self::issue_command("add-mask", None, value);
    }

    fn error(&self, message: &str) {
        error!("{message}");
        Self::issue_command("error", None, message);
    }

    fn set_failed(&self, message: &str) {
        self.failed.store(true, Ordering::SeqCst);
        self.error(message);
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_escape_data() {
        assert_eq!(escape_data("50%\r\nnext"), "50%25%0D%0Anext");
        assert_eq!(escape_property("a:b,c"), "a%3Ab%2Cc");
    }

    #[test]
    fn test_command_line() {
        assert_eq!(
            command_line("save-state", Some(("name", "isPost")), "true"),
            "::save-state name=isPost::true"
        );
        assert_eq!(command_line("add-mask", None, "a\nb"), "::add-mask::a%0Ab");
        assert_eq!(command_line("endgroup", None, ""), "::endgroup::");
    }

    #[test]
    fn test_key_value_message() {
        let message = key_value_message("che-url", "https://123.123.123.123").unwrap();
        let lines: Vec<&str> = message.lines().collect();

        assert_eq!(lines.len(), 3);
        let (key, delimiter) = lines[0].split_once("<<").unwrap();
        assert_eq!(key, "che-url");
        assert!(delimiter.starts_with("ghadelimiter_"));
        assert_eq!(lines[1], "https://123.123.123.123");
        assert_eq!(lines[2], delimiter);
        assert!(message.ends_with('\n'));
    }

    #[test]
    fn test_outputs_and_state_appended_to_files() {
        let temp_dir = TempDir::new().unwrap();
        let output_file = temp_dir.path().join("output");
        let state_file = temp_dir.path().join("state");
        let workflow = Workflow::new(
            Some(output_file.clone()),
            Some(state_file.clone()),
            HashMap::new(),
        );

        workflow.set_output("che-url", "https://che.local").unwrap();
        workflow.set_output("che-token", "my-token").unwrap();
        workflow.save_state("isPost", "true").unwrap();

        let outputs = std::fs::read_to_string(&output_file).unwrap();
        assert!(outputs.starts_with("che-url<<ghadelimiter_"));
        assert!(outputs.contains("\nhttps://che.local\n"));
        assert!(outputs.contains("che-token<<ghadelimiter_"));
        assert!(outputs.contains("\nmy-token\n"));

        let state = std::fs::read_to_string(&state_file).unwrap();
        assert!(state.starts_with("isPost<<ghadelimiter_"));
        assert!(state.contains("\ntrue\n"));
    }

    #[test]
    fn test_saved_state_lookup() {
        let saved = HashMap::from([
            ("isPost".to_string(), "true".to_string()),
            ("empty".to_string(), String::new()),
        ]);
        let workflow = Workflow::new(None, None, saved);

        assert_eq!(workflow.get_state("isPost").as_deref(), Some("true"));
        assert_eq!(workflow.get_state("empty"), None);
        assert_eq!(workflow.get_state("missing"), None);
    }

    #[test]
    fn test_set_failed_marks_run() {
        let workflow = Workflow::default();
        assert!(!workflow.has_failed());

        workflow.error("only an annotation");
        assert!(!workflow.has_failed());

        workflow.set_failed("No HOME environment variable found");
        assert!(workflow.has_failed());
    }
}
