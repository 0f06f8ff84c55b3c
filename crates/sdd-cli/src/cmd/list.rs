use crate::output::{print_json, print_table};
use sdd_core::{feature, types::SpecStatus};
use std::path::Path;

pub fn run(root: &Path, status: Option<&str>, json: bool) -> anyhow::Result<()> {
    let wanted = status.map(str::parse::<SpecStatus>).transpose()?;
    let specs: Vec<_> = feature::list_specs(root)?
        .into_iter()
        .filter(|s| wanted.map(|w| s.status == w.as_str()).unwrap_or(true))
        .collect();

    if json {
        return print_json(&specs);
    }
    if specs.is_empty() {
        println!("No specs.");
        return Ok(());
    }

    let rows = specs
        .iter()
        .map(|s| {
            vec![
                s.id.clone(),
                s.status.clone(),
                s.phase.to_string(),
                s.requirements.to_string(),
                s.scenarios.to_string(),
                s.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "PHASE", "REQS", "SCENARIOS", "TITLE"], rows);
    Ok(())
}
