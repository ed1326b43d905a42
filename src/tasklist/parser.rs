//! Task-list line parsing.
//!
//! The grammar shared by ingestion and the completion watcher:
//!
//! ```text
//! - [<checkbox>] [<T###>] [<markers>...] <description>
//! ```
//!
//! `<checkbox>` is `x`, `X`, or a single space. Markers may appear in any
//! order: `[P]` (parallelizable), `[US<n>]` (story tag), `[deps:T###,...]`
//! (dependencies, empty list allowed). Backtick-quoted paths in the
//! description that end with a short file extension are harvested into the
//! task's `files`.

use super::types::{Task, is_valid_task_id};
use anyhow::{Result, bail};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static TASK_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-\s*\[( |x|X)\]\s*\[(T\d{3})\]\s*(.*)$").unwrap());

static MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(P|US\d+|deps:[^\]]*)\]\s*").unwrap());

static BACKTICK_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+\.[A-Za-z0-9]{1,5})`").unwrap());

/// Parse the full task-list document into tasks, preserving source order.
///
/// Lines that do not match the task grammar (headings, prose, blank lines)
/// are skipped. A line that matches the grammar but carries a malformed
/// dependency list is rejected with the offending line in the message.
pub fn parse_tasks(content: &str) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if let Some(task) = parse_task_line(line)
            .map_err(|e| e.context(format!("tasks.md line {}: {}", lineno + 1, line.trim())))?
        {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

/// Parse one line. Returns `Ok(None)` for non-task lines.
pub fn parse_task_line(line: &str) -> Result<Option<Task>> {
    let Some(caps) = TASK_LINE_REGEX.captures(line) else {
        return Ok(None);
    };

    let checkbox = caps.get(1).map_or(" ", |m| m.as_str());
    let id = caps[2].to_string();
    let mut rest = caps.get(3).map_or("", |m| m.as_str());

    let mut task = Task::new(&id, "");
    task.completed = checkbox.eq_ignore_ascii_case("x");

    // Strip leading markers in any order.
    while let Some(caps) = MARKER_REGEX.captures(rest) {
        let marker = &caps[1];
        if marker == "P" {
            task.parallelizable = true;
        } else if let Some(deps) = marker.strip_prefix("deps:") {
            task.dependencies = parse_deps(deps)?;
        } else {
            task.story = Some(marker.to_string());
        }
        rest = &rest[caps[0].len()..];
    }

    task.name = rest.trim().to_string();
    task.files = BACKTICK_PATH_REGEX
        .captures_iter(rest)
        .map(|caps| caps[1].to_string())
        .collect();

    Ok(Some(task))
}

fn parse_deps(deps: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for token in deps.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if !is_valid_task_id(token) {
            bail!("Invalid dependency id '{}' (expected T###)", token);
        }
        out.push(token.to_string());
    }
    Ok(out)
}

/// Extract the ids of all checked-off tasks from a task-list document.
///
/// This is the read used by the completion detector: only closed checkboxes
/// count, and malformed lines are ignored rather than rejected.
pub fn completed_ids(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter_map(|line| TASK_LINE_REGEX.captures(line))
        .filter(|caps| caps[1].eq_ignore_ascii_case("x"))
        .map(|caps| caps[2].to_string())
        .collect()
}
