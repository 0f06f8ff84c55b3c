use crate::output::{mark, print_json};
use sdd_core::prepare;
use std::path::Path;

pub fn run(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let report = prepare::prepare(root, id)?;
    if json {
        return print_json(&report);
    }

    println!("{} ({}): {}", report.feature, report.title, report.phase);
    for c in &report.checks {
        println!("  {} {:<22} {}", mark(c.passed), c.name, c.detail);
    }
    println!("\nNext: {}", report.next_step);
    Ok(())
}
