use super::ValidationFailed;
use crate::output::{mark, print_json};
use sdd_core::{config::Config, sync};
use std::path::Path;

pub fn run(root: &Path, id: Option<&str>, threshold: Option<f64>, json: bool) -> anyhow::Result<()> {
    let cfg = Config::load(root)?;
    let result = sync::sync_project(root, &cfg.sync, id)?;

    if json {
        print_json(&result)?;
    } else {
        for r in &result.requirements {
            let refs: Vec<String> = r
                .code_refs
                .iter()
                .chain(&r.test_refs)
                .map(|c| format!("{}:{}", c.file, c.line))
                .collect();
            let tested = if r.is_tested() { " (tested)" } else { "" };
            println!(
                "{} {}/{}{tested} {}",
                mark(r.is_implemented()),
                r.spec,
                r.id,
                refs.join(", ")
            );
        }
        if !result.orphans.is_empty() {
            println!("\nReferences to unknown requirements:");
            for o in &result.orphans {
                println!("  {} at {}:{}", o.req_id, o.file, o.line);
            }
        }
        println!(
            "\n{}/{} implemented, {} tested, sync rate {:.2}%",
            result.implemented, result.total, result.tested, result.sync_rate
        );
    }

    match threshold {
        Some(min) if result.sync_rate < min => Err(ValidationFailed(format!(
            "sync rate {:.2}% is below threshold {min:.2}%",
            result.sync_rate
        ))
        .into()),
        _ => Ok(()),
    }
}
