use crate::output::print_json;
use anyhow::Context;
use sdd_core::{feature, paths};
use std::path::Path;

pub fn run(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let s = feature::create_plan(root, id).with_context(|| format!("cannot plan '{id}'"))?;
    let rel = paths::display_rel(root, &s.path);
    if json {
        print_json(&serde_json::json!({ "id": id, "path": rel, "created": s.created }))?;
    } else if s.created {
        println!("  created: {rel}");
        println!("\nNext: sdd tasks {id}");
    } else {
        println!("  exists:  {rel}");
    }
    Ok(())
}
