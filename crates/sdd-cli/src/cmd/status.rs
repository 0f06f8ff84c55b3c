use crate::output::{print_json, print_table};
use anyhow::Context;
use sdd_core::{
    change, feature,
    spec::Spec,
    types::{ChangeStatus, SpecStatus},
};
use std::collections::BTreeMap;
use std::path::Path;

pub fn run(root: &Path, id: Option<&str>, set: Option<&str>, json: bool) -> anyhow::Result<()> {
    match (id, set) {
        (Some(id), Some(status)) => set_status(root, id, status, json),
        (Some(id), None) => show_one(root, id, json),
        (None, _) => show_project(root, json),
    }
}

fn set_status(root: &Path, id: &str, status: &str, json: bool) -> anyhow::Result<()> {
    let status: SpecStatus = status.parse()?;
    feature::update_status(root, id, status)
        .with_context(|| format!("cannot update status of '{id}'"))?;
    if json {
        print_json(&serde_json::json!({ "id": id, "status": status }))?;
    } else {
        println!("{id}: status set to {status}");
    }
    Ok(())
}

fn show_one(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let spec = Spec::load(root, id)?;
    let summary = feature::summarize(root, &spec)?;
    let pending = change::pending_changes_for(root, id)?;

    if json {
        return print_json(&serde_json::json!({
            "spec": summary,
            "pending_changes": pending,
        }));
    }

    println!("{} ({})", summary.title, summary.id);
    println!("  status:       {}", summary.status);
    println!("  phase:        {}", summary.phase);
    println!("  requirements: {}", summary.requirements);
    println!("  scenarios:    {}", summary.scenarios);
    if !summary.depends_on.is_empty() {
        println!("  depends on:   {}", summary.depends_on.join(", "));
    }
    if let Some(p) = &summary.tasks {
        println!("  tasks:        {}/{} done ({}%)", p.done, p.total, p.percent);
    }
    if !pending.is_empty() {
        println!("  changes:      {}", pending.join(", "));
    }
    Ok(())
}

fn show_project(root: &Path, json: bool) -> anyhow::Result<()> {
    let specs = feature::list_specs(root)?;
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_phase: BTreeMap<String, usize> = BTreeMap::new();
    for s in &specs {
        *by_status.entry(s.status.clone()).or_default() += 1;
        *by_phase.entry(s.phase.to_string()).or_default() += 1;
    }
    let changes: Vec<_> = change::list_changes(root)?
        .into_iter()
        .filter(|c| {
            matches!(
                c.status,
                ChangeStatus::Draft | ChangeStatus::Proposed | ChangeStatus::Approved
            )
        })
        .collect();

    if json {
        return print_json(&serde_json::json!({
            "specs": specs.len(),
            "by_status": by_status,
            "by_phase": by_phase,
            "open_changes": changes.len(),
        }));
    }

    println!("{} spec(s), {} open change(s)\n", specs.len(), changes.len());
    let rows = by_status
        .iter()
        .map(|(k, v)| vec![k.clone(), v.to_string()])
        .collect();
    print_table(&["STATUS", "COUNT"], rows);
    println!();
    let rows = by_phase
        .iter()
        .map(|(k, v)| vec![k.clone(), v.to_string()])
        .collect();
    print_table(&["PHASE", "COUNT"], rows);
    Ok(())
}
