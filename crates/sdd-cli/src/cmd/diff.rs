use crate::output::print_json;
use sdd_core::{diff, git};
use std::path::Path;

pub fn run(
    root: &Path,
    id: Option<&str>,
    from: &str,
    to: Option<&str>,
    stat: bool,
    json: bool,
) -> anyhow::Result<()> {
    let to = to.unwrap_or(git::WORKTREE);
    let result = diff::diff_project(root, from, to, id)?;

    if json {
        return print_json(&serde_json::json!({
            "from": result.from,
            "to": result.to,
            "severity": result.severity(),
            "specs": result.specs,
        }));
    }
    if stat {
        print!("{}", diff::render_stat(&result));
    } else {
        print!("{}", diff::render_text(&result));
    }
    if let Some(sev) = result.severity() {
        println!("\nSuggested version bump: {sev}");
    }
    Ok(())
}
