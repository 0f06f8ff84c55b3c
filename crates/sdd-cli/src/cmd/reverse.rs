use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use sdd_core::{
    config::Config,
    paths,
    reverse::{self, ExtractOptions},
};
use std::path::Path;

#[derive(Subcommand)]
pub enum ReverseSubcommand {
    /// Scan source directories and guess domains
    Scan,
    /// Write draft specs for the scanned domains
    Extract {
        /// Only extract these domains (repeatable)
        #[arg(long = "domain")]
        domains: Vec<String>,
        /// Overwrite existing specs
        #[arg(long)]
        force: bool,
        /// Fail when the Serena MCP server is not available
        #[arg(long)]
        require_serena: bool,
    },
    /// List extracted drafts awaiting review
    Review,
    /// Promote a reviewed draft into the normal workflow
    Finalize { id: String },
}

pub fn run(root: &Path, subcmd: ReverseSubcommand, json: bool) -> anyhow::Result<()> {
    paths::ensure_initialized(root)?;
    match subcmd {
        ReverseSubcommand::Scan => scan(root, json),
        ReverseSubcommand::Extract {
            domains,
            force,
            require_serena,
        } => extract(
            root,
            ExtractOptions {
                domains,
                force,
                require_serena,
            },
            json,
        ),
        ReverseSubcommand::Review => review(root, json),
        ReverseSubcommand::Finalize { id } => finalize(root, &id, json),
    }
}

fn scan(root: &Path, json: bool) -> anyhow::Result<()> {
    let cfg = Config::load_or_default(root);
    let result = reverse::scan(root, &cfg).context("source scan failed")?;
    reverse::record_scan(root, &result)?;
    let serena = reverse::serena_status();

    if json {
        return print_json(&serde_json::json!({
            "scan": result,
            "serena": serena,
        }));
    }

    println!(
        "Scanned {} file(s), {} line(s)",
        result.files, result.total_lines
    );
    let langs = result
        .languages
        .iter()
        .map(|(lang, s)| vec![lang.clone(), s.files.to_string(), s.lines.to_string()])
        .collect();
    print_table(&["LANGUAGE", "FILES", "LINES"], langs);

    println!();
    let domains = result
        .domains
        .iter()
        .map(|d| {
            vec![
                d.name.clone(),
                d.files.len().to_string(),
                d.languages.join(", "),
            ]
        })
        .collect();
    print_table(&["DOMAIN", "FILES", "LANGUAGES"], domains);

    match &serena.via {
        Some(via) => println!("\nSerena MCP: available ({via})"),
        None => println!("\nSerena MCP: not available; {}", reverse::SERENA_INSTALL_HINT),
    }
    println!("Next: sdd reverse extract");
    Ok(())
}

fn extract(root: &Path, opts: ExtractOptions, json: bool) -> anyhow::Result<()> {
    let cfg = Config::load_or_default(root);
    let result = reverse::scan(root, &cfg).context("source scan failed")?;
    let report = reverse::extract(root, &result, &opts)?;
    if json {
        return print_json(&report);
    }
    for id in &report.created {
        println!("  created: {}", paths::display_rel(root, &paths::spec_file(root, id)));
    }
    for id in &report.skipped {
        println!("  exists:  {}", paths::display_rel(root, &paths::spec_file(root, id)));
    }
    if !report.created.is_empty() {
        println!("\nNext: sdd reverse review");
    }
    Ok(())
}

fn review(root: &Path, json: bool) -> anyhow::Result<()> {
    let drafts = reverse::review(root)?;
    if json {
        return print_json(&drafts);
    }
    if drafts.is_empty() {
        println!("No extracted drafts awaiting review.");
        return Ok(());
    }
    let rows = drafts
        .iter()
        .map(|d| {
            vec![
                d.id.clone(),
                d.status.clone(),
                d.requirements.to_string(),
                d.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "REQS", "TITLE"], rows);
    println!("\nEdit each draft, then 'sdd reverse finalize <id>'");
    Ok(())
}

fn finalize(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    reverse::finalize(root, id)?;
    if json {
        return print_json(&serde_json::json!({ "id": id, "status": "review" }));
    }
    println!("Finalized {id} (status: review)");
    Ok(())
}
