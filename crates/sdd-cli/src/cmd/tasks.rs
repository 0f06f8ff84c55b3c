use crate::output::{print_json, print_table};
use anyhow::Context;
use sdd_core::{
    feature, paths,
    tasks::{self, TaskProgress, TaskStatus},
};
use std::path::Path;

pub enum Update {
    None,
    Set(String, TaskStatus),
}

impl Update {
    pub fn from_flags(done: Option<String>, start: Option<String>, reset: Option<String>) -> Self {
        match (done, start, reset) {
            (Some(id), _, _) => Update::Set(id, TaskStatus::Done),
            (_, Some(id), _) => Update::Set(id, TaskStatus::InProgress),
            (_, _, Some(id)) => Update::Set(id, TaskStatus::Todo),
            _ => Update::None,
        }
    }
}

pub fn run(root: &Path, id: &str, update: Update, json: bool) -> anyhow::Result<()> {
    if let Update::Set(task_id, status) = update {
        let task = tasks::mark_task(root, id, &task_id, status)
            .with_context(|| format!("cannot update task '{task_id}' of '{id}'"))?;
        if json {
            return print_json(&serde_json::json!({ "id": id, "task": task }));
        }
        println!("[{}] {} {}", task.status.mark(), task.id, task.title);
        return Ok(());
    }

    let scaffold = feature::create_tasks(root, id)
        .with_context(|| format!("cannot scaffold tasks for '{id}'"))?;
    let items = tasks::load_tasks(root, id)?.unwrap_or_default();
    let progress = TaskProgress::of(&items);

    if json {
        return print_json(&serde_json::json!({
            "id": id,
            "path": paths::display_rel(root, &scaffold.path),
            "created": scaffold.created,
            "progress": progress,
            "tasks": items,
        }));
    }

    if scaffold.created {
        println!("  created: {}\n", paths::display_rel(root, &scaffold.path));
    }
    let rows = items
        .iter()
        .map(|t| vec![t.id.clone(), format!("[{}]", t.status.mark()), t.title.clone()])
        .collect();
    print_table(&["ID", "STATE", "TITLE"], rows);
    println!("\n{}/{} done ({}%)", progress.done, progress.total, progress.percent);
    Ok(())
}
