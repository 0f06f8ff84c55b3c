use crate::output::print_json;
use sdd_core::{config::Config, graph};
use std::path::Path;

pub fn run(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let cfg = Config::load(root)?;
    let report = graph::impact_report(root, &cfg, id)?;
    if json {
        return print_json(&report);
    }

    println!("Impact of changing {}: {} risk", report.spec, report.risk);
    let list = |v: &[String]| {
        if v.is_empty() {
            "none".to_string()
        } else {
            v.join(", ")
        }
    };
    println!("  depends on:            {}", list(&report.depends_on));
    println!("  direct dependents:     {}", list(&report.direct_dependents));
    println!("  transitive dependents: {}", list(&report.transitive_dependents));
    println!("  referencing files:     {}", report.affected_files.len());
    for f in &report.affected_files {
        println!("    {f}");
    }
    Ok(())
}
