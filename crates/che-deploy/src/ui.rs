//! Job log layout.
//!
//! Each install step gets its own collapsible group in the runner log, and
//! outcomes are raised as annotations so they surface on the run summary.

use colored::Colorize;

use crate::workflow::command_line;

/// An open log group. The group ends when this is dropped, so a step that
/// fails with `?` still closes its group.
#[must_use = "the group ends as soon as this value is dropped"]
#[derive(Debug)]
pub struct LogGroup(());

impl LogGroup {
    pub fn start(title: &str) -> Self {
        println!("{}", command_line("group", None, title));
        Self(())
    }
}

impl Drop for LogGroup {
    fn drop(&mut self) {
        println!("{}", command_line("endgroup", None, ""));
    }
}

/// Group title for step `current` of `total`.
#[must_use]
pub fn step_title(current: u8, total: u8, message: &str) -> String {
    format!("[{current}/{total}] {message}")
}

/// Open the log group of one step.
pub fn step(current: u8, total: u8, message: &str) -> LogGroup {
    LogGroup::start(&step_title(current, total, message))
}

/// Raise a notice annotation.
pub fn notice(message: &str) {
    println!("{}", command_line("notice", None, message));
}

/// Raise a warning annotation.
pub fn warning(message: &str) {
    println!("{}", command_line("warning", None, message));
}

/// Echo a published (non-secret) step output.
pub fn output(name: &str, value: &str) {
    println!("{} {}={}", "output".bright_black(), name.bold(), value.cyan());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_title() {
        assert_eq!(
            step_title(4, 7, "Eclipse Che [serverDeploy]..."),
            "[4/7] Eclipse Che [serverDeploy]..."
        );
    }

    #[test]
    fn test_step_group_command() {
        assert_eq!(
            command_line("group", None, &step_title(1, 7, "Chectl [download]...")),
            "::group::[1/7] Chectl [download]..."
        );
    }
}
