use super::ValidationFailed;
use crate::output::{mark, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use sdd_core::{change, paths, types::ChangeStatus};
use std::path::Path;

#[derive(Subcommand)]
pub enum ChangeSubcommand {
    /// Create a change proposal with delta and task files
    Create {
        #[arg(required = true)]
        title: Vec<String>,
        /// Comma-separated ids of the specs this change touches
        #[arg(long = "spec", value_delimiter = ',')]
        specs: Vec<String>,
    },
    /// List open changes
    List {
        /// List archived changes instead
        #[arg(long)]
        archived: bool,
    },
    /// Show a change and its delta
    Show { id: String },
    /// Check the proposal and delta against the current specs
    Validate { id: String },
    /// Mark a change proposed (ready for review)
    Propose { id: String },
    /// Approve a change for applying
    Approve { id: String },
    /// Reject a change
    Reject { id: String },
    /// Apply the delta to the target specs
    Apply {
        id: String,
        /// Apply even when the change is not approved
        #[arg(long)]
        force: bool,
    },
    /// Move a change into the dated archive
    Archive { id: String },
}

pub fn run(root: &Path, subcmd: ChangeSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ChangeSubcommand::Create { title, specs } => create(root, &title.join(" "), &specs, json),
        ChangeSubcommand::List { archived } => list(root, archived, json),
        ChangeSubcommand::Show { id } => show(root, &id, json),
        ChangeSubcommand::Validate { id } => validate(root, &id, json),
        ChangeSubcommand::Propose { id } => set_status(root, &id, ChangeStatus::Proposed, json),
        ChangeSubcommand::Approve { id } => set_status(root, &id, ChangeStatus::Approved, json),
        ChangeSubcommand::Reject { id } => set_status(root, &id, ChangeStatus::Rejected, json),
        ChangeSubcommand::Apply { id, force } => apply(root, &id, force, json),
        ChangeSubcommand::Archive { id } => archive(root, &id, json),
    }
}

fn create(root: &Path, title: &str, specs: &[String], json: bool) -> anyhow::Result<()> {
    let c = change::create_change(root, title, specs).context("cannot create change")?;
    if json {
        return print_json(&c);
    }
    println!("Created change {}: {}", c.id, c.title);
    for p in [c.proposal_path(), c.delta_path(), c.tasks_path()] {
        println!("  created: {}", paths::display_rel(root, &p));
    }
    println!("\nNext: describe the delta, then 'sdd change validate {}'", c.id);
    Ok(())
}

fn list(root: &Path, archived: bool, json: bool) -> anyhow::Result<()> {
    if archived {
        let items = change::list_archived(root)?;
        if json {
            return print_json(&items);
        }
        let rows = items
            .iter()
            .map(|a| vec![a.id.clone(), a.month.clone(), a.change.title.clone()])
            .collect();
        print_table(&["ARCHIVE", "MONTH", "TITLE"], rows);
        return Ok(());
    }

    let items = change::list_changes(root)?;
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("No open changes.");
        return Ok(());
    }
    let rows = items
        .iter()
        .map(|c| {
            vec![
                c.id.clone(),
                c.status.to_string(),
                c.affected_specs.join(", "),
                c.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "SPECS", "TITLE"], rows);
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let c = change::load_change(root, id)?;
    let delta = c.delta();
    if json {
        return print_json(&serde_json::json!({
            "change": c,
            "delta": delta.as_ref().ok(),
            "delta_error": delta.as_ref().err().map(|e| e.to_string()),
        }));
    }

    println!("{}: {}", c.id, c.title);
    println!("  status:  {}", c.status);
    if let Some(created) = &c.created {
        println!("  created: {created}");
    }
    println!("  specs:   {}", c.affected_specs.join(", "));
    match delta {
        Ok(d) => {
            for (kind, item) in d.items() {
                println!("  {:<8} {}: {}", kind.as_str(), item.id, item.title);
            }
        }
        Err(e) => println!("  delta:   {e}"),
    }
    Ok(())
}

fn validate(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let v = change::validate_change(root, id)?;
    if json {
        print_json(&serde_json::json!({
            "id": v.id,
            "valid": v.is_valid(),
            "issues": v.issues,
        }))?;
    } else {
        println!("{} {}", mark(v.is_valid()), v.id);
        for issue in &v.issues {
            println!("    [{}] {}", issue.code, issue.message);
        }
    }
    if v.is_valid() {
        Ok(())
    } else {
        Err(ValidationFailed(format!("change {id} has {} issue(s)", v.issues.len())).into())
    }
}

fn set_status(root: &Path, id: &str, status: ChangeStatus, json: bool) -> anyhow::Result<()> {
    let c = change::set_change_status(root, id, status)?;
    if json {
        print_json(&serde_json::json!({ "id": c.id, "status": c.status }))?;
    } else {
        println!("{}: {}", c.id, c.status);
    }
    Ok(())
}

fn apply(root: &Path, id: &str, force: bool, json: bool) -> anyhow::Result<()> {
    let report = change::apply_change(root, id, force)
        .with_context(|| format!("cannot apply change {id}"))?;
    if json {
        return print_json(&report);
    }
    println!("Applied {}", report.id);
    for s in &report.specs {
        println!(
            "  {}: +{} ~{} -{}",
            s.spec,
            s.added.len(),
            s.modified.len(),
            s.removed.len()
        );
    }
    println!("\nNext: sdd change archive {id}");
    Ok(())
}

fn archive(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let today = chrono::Local::now().date_naive();
    let dest = change::archive_change(root, id, today)?;
    let rel = paths::display_rel(root, &dest);
    if json {
        print_json(&serde_json::json!({ "id": id, "archived_to": rel }))?;
    } else {
        println!("Archived {id} to {rel}");
    }
    Ok(())
}
