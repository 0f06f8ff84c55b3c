use crate::output::{print_json, print_table};
use sdd_core::{graph::DependencyGraph, paths, spec};
use std::path::Path;

pub fn run(root: &Path, mermaid: bool, json: bool) -> anyhow::Result<()> {
    paths::ensure_initialized(root)?;
    let graph = DependencyGraph::build(&spec::load_all(root)?);

    if json {
        return print_json(&serde_json::json!({
            "nodes": graph.nodes,
            "cycles": graph.find_cycles(),
            "unknown": graph
                .unknown_dependencies()
                .into_iter()
                .map(|(s, d)| serde_json::json!({ "spec": s, "dependency": d }))
                .collect::<Vec<_>>(),
        }));
    }
    if mermaid {
        print!("{}", graph.to_mermaid());
        return Ok(());
    }

    let rows = graph
        .nodes
        .iter()
        .map(|(id, n)| vec![id.clone(), n.depends_on.join(", "), n.depended_by.join(", ")])
        .collect();
    print_table(&["SPEC", "DEPENDS ON", "DEPENDED BY"], rows);
    for cycle in graph.find_cycles() {
        println!("\ncycle: {}", cycle.join(" -> "));
    }
    for (s, d) in graph.unknown_dependencies() {
        println!("unknown dependency: {s} -> {d}");
    }
    Ok(())
}
