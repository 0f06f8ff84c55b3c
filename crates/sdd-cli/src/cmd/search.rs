use crate::output::{print_json, print_table};
use sdd_core::search;
use std::path::Path;

pub fn run(root: &Path, query: &str, limit: usize, json: bool) -> anyhow::Result<()> {
    let results = search::search(root, query, limit)?;
    if json {
        return print_json(&results);
    }
    if results.is_empty() {
        println!("No specs match '{query}'.");
        return Ok(());
    }
    let rows = results
        .iter()
        .map(|r| vec![r.id.clone(), r.status.clone(), format!("{:.2}", r.score), r.title.clone()])
        .collect();
    print_table(&["ID", "STATUS", "SCORE", "TITLE"], rows);
    Ok(())
}
