use crate::error::{Result, SddError};
use crate::feature::generate_task_id;
use crate::paths;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    fn from_mark(mark: &str) -> Self {
        match mark {
            "x" | "X" => TaskStatus::Done,
            "~" => TaskStatus::InProgress,
            _ => TaskStatus::Todo,
        }
    }

    pub fn mark(self) -> char {
        match self {
            TaskStatus::Todo => ' ',
            TaskStatus::InProgress => '~',
            TaskStatus::Done => 'x',
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = SddError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "todo" | "pending" | "open" => Ok(TaskStatus::Todo),
            "in_progress" | "wip" | "started" => Ok(TaskStatus::InProgress),
            "done" | "complete" | "completed" => Ok(TaskStatus::Done),
            _ => Err(SddError::InvalidStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    /// 1-based line in tasks.md.
    pub line: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub total: usize,
    pub done: usize,
    pub in_progress: usize,
    pub percent: u8,
}

impl TaskProgress {
    pub fn of(tasks: &[TaskItem]) -> Self {
        let total = tasks.len();
        let done = tasks.iter().filter(|t| t.status == TaskStatus::Done).count();
        let in_progress = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .count();
        let percent = if total == 0 {
            0
        } else {
            (done * 100 / total) as u8
        };
        Self {
            total,
            done,
            in_progress,
            percent,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.done == self.total
    }
}

static CHECKBOX_RE: OnceLock<Regex> = OnceLock::new();

fn checkbox_re() -> &'static Regex {
    CHECKBOX_RE.get_or_init(|| {
        Regex::new(r"^(\s*[-*+]\s+\[)([ xX~])(\]\s+)(?:(T\d+)\s*[:.\-]\s*)?(.*)$").unwrap()
    })
}

/// Parse checkbox lines. Tasks without an explicit `Tnnn` id get the next
/// free sequential one.
pub fn parse_tasks(content: &str) -> Vec<TaskItem> {
    let re = checkbox_re();
    let mut raw = Vec::new();
    let mut in_fence = false;
    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(c) = re.captures(line) {
            raw.push((
                c.get(4).map(|m| m.as_str().to_string()),
                c[5].trim().to_string(),
                TaskStatus::from_mark(&c[2]),
                idx + 1,
            ));
        }
    }

    let mut taken: HashSet<String> = raw.iter().filter_map(|(id, ..)| id.clone()).collect();
    let mut next = 1u32;
    raw.into_iter()
        .map(|(id, title, status, line)| {
            let id = id.unwrap_or_else(|| {
                while taken.contains(&generate_task_id(next)) {
                    next += 1;
                }
                let id = generate_task_id(next);
                taken.insert(id.clone());
                id
            });
            TaskItem {
                id,
                title,
                status,
                line,
            }
        })
        .collect()
}

/// Rewrite the checkbox of task `id` in place; every other byte is kept.
pub fn set_task_status(content: &str, id: &str, status: TaskStatus) -> Result<String> {
    let task = parse_tasks(content)
        .into_iter()
        .find(|t| t.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| SddError::TaskNotFound(id.to_string()))?;

    let mut out = String::with_capacity(content.len());
    for (idx, line) in content.split_inclusive('\n').enumerate() {
        let bare = line.trim_end_matches(['\n', '\r']);
        match checkbox_re().captures(bare).and_then(|c| c.get(2)) {
            Some(mark) if idx + 1 == task.line => {
                out.push_str(&line[..mark.start()]);
                out.push(status.mark());
                out.push_str(&line[mark.end()..]);
            }
            _ => out.push_str(line),
        }
    }
    Ok(out)
}

pub fn load_tasks(root: &Path, spec_id: &str) -> Result<Option<Vec<TaskItem>>> {
    Ok(crate::io::read_optional(&paths::tasks_file(root, spec_id))?.map(|c| parse_tasks(&c)))
}

/// Update one task in `.sdd/specs/<spec_id>/tasks.md`.
pub fn mark_task(root: &Path, spec_id: &str, task_id: &str, status: TaskStatus) -> Result<TaskItem> {
    let path = paths::tasks_file(root, spec_id);
    let content = crate::io::read_optional(&path)?
        .ok_or_else(|| SddError::TaskNotFound(format!("{spec_id} has no tasks.md")))?;
    let updated = set_task_status(&content, task_id, status)?;
    crate::io::atomic_write(&path, updated.as_bytes())?;
    tracing::info!(spec = spec_id, task = task_id, status = %status, "task updated");
    parse_tasks(&updated)
        .into_iter()
        .find(|t| t.id.eq_ignore_ascii_case(task_id))
        .ok_or_else(|| SddError::TaskNotFound(task_id.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TASKS: &str = "# Tasks\n\n- [ ] T001: Write parser\n- [x] T002: Add CLI\n* [~] Wire output\n- [X] T004 - Docs\n\n```\n- [ ] T009: not a task\n```\n";

    #[test]
    fn parses_marks_and_ids() {
        let tasks = parse_tasks(TASKS);
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].id, "T001");
        assert_eq!(tasks[1].status, TaskStatus::Done);
        assert_eq!(tasks[2].id, "T003");
        assert_eq!(tasks[2].title, "Wire output");
        assert_eq!(tasks[2].status, TaskStatus::InProgress);
        assert_eq!(tasks[3].title, "Docs");
        assert_eq!(tasks[3].line, 6);
    }

    #[test]
    fn progress_counts() {
        let p = TaskProgress::of(&parse_tasks(TASKS));
        assert_eq!((p.total, p.done, p.in_progress, p.percent), (4, 2, 1, 50));
        assert!(!p.is_complete());
        assert_eq!(TaskProgress::of(&[]).percent, 0);
    }

    #[test]
    fn set_status_rewrites_only_the_checkbox() {
        let out = set_task_status(TASKS, "T001", TaskStatus::Done).unwrap();
        assert!(out.contains("- [x] T001: Write parser\n"));
        assert_eq!(out.len(), TASKS.len());

        let out = set_task_status(&out, "t003", TaskStatus::Todo).unwrap();
        assert!(out.contains("* [ ] Wire output\n"));
    }

    #[test]
    fn unknown_task_is_error() {
        let err = set_task_status(TASKS, "T099", TaskStatus::Done).unwrap_err();
        assert_eq!(err.code(), "E005");
    }
}
