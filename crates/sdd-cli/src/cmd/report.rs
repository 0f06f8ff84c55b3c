use crate::output::print_json;
use sdd_core::{
    config::Config,
    export::ExportFormat,
    io, paths,
    report::{self, ProjectReport},
};
use std::path::Path;

pub fn run(
    root: &Path,
    format: Option<&str>,
    output: Option<&Path>,
    with_sync: bool,
    json: bool,
) -> anyhow::Result<()> {
    let cfg = Config::load(root)?;
    let r: ProjectReport = report::build_report(root, &cfg, with_sync)?;

    if json && output.is_none() {
        return print_json(&r);
    }

    let fmt = match format {
        Some(f) => ExportFormat::parse(f)?,
        None if output.is_none() => ExportFormat::Markdown,
        None => ExportFormat::parse(&cfg.export.default_format)?,
    };
    let body = report::render_report(&r, fmt)?;

    match output {
        Some(path) => {
            io::atomic_write(path, body.as_bytes())?;
            if json {
                let file = paths::display_rel(root, path);
                print_json(&serde_json::json!({ "format": fmt, "file": file }))?;
            } else {
                println!("  wrote: {}", paths::display_rel(root, path));
            }
        }
        None => print!("{body}"),
    }
    Ok(())
}
