use crate::output::print_json;
use sdd_core::{
    config::Config,
    context::Context,
    export::{self, ExportFormat},
    spec::{self, Spec},
};
use std::path::Path;

pub fn run(
    root: &Path,
    id: Option<&str>,
    format: Option<&str>,
    output: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let cfg = Config::load(root)?;
    let fmt = ExportFormat::parse(format.unwrap_or(&cfg.export.default_format))?;

    let specs: Vec<Spec> = match id {
        Some(id) => vec![Spec::load(root, id)?],
        None => {
            let ctx = Context::load(root)?;
            let mut all: Vec<Spec> = spec::load_all(root)?
                .into_iter()
                .filter(|s| ctx.includes(&s.id))
                .collect();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            all
        }
    };
    if specs.is_empty() {
        anyhow::bail!("nothing to export: no specs found");
    }

    let written = export::write_export(&specs, fmt, output, &root.join(&cfg.export.output_dir))?;
    let rel: Vec<String> = written
        .iter()
        .map(|p| sdd_core::paths::display_rel(root, p))
        .collect();

    if json {
        print_json(&serde_json::json!({ "format": fmt, "files": rel }))?;
    } else {
        for f in &rel {
            println!("  wrote: {f}");
        }
    }
    Ok(())
}
