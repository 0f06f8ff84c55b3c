use crate::output::print_json;
use anyhow::Context;
use sdd_core::{feature, paths};
use std::path::Path;

pub fn run(root: &Path, name: &str, opts: feature::CreateOptions, json: bool) -> anyhow::Result<()> {
    let created = feature::create_feature(root, name, &opts)
        .with_context(|| format!("cannot create feature '{name}'"))?;

    if json {
        return print_json(&serde_json::json!({
            "id": created.id,
            "title": created.title,
            "number": created.number,
            "branch": created.branch,
            "files": created.files.iter().map(|f| paths::display_rel(root, f)).collect::<Vec<_>>(),
        }));
    }

    println!("Created feature '{}': {}", created.id, created.title);
    for f in &created.files {
        println!("  created: {}", paths::display_rel(root, f));
    }
    if let Some(branch) = &created.branch {
        println!("  branch:  {branch}");
    }
    println!("\nNext: edit the spec, then run 'sdd validate {}'", created.id);
    Ok(())
}
