use super::ValidationFailed;
use crate::output::{mark, print_json};
use anyhow::Context;
use clap::Subcommand;
use sdd_core::{
    constitution::{self, BumpKind},
    paths,
    spec::Spec,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConstitutionSubcommand {
    /// Print the principles and their rules
    Show,
    /// Check the constitution's structure
    Validate,
    /// Bump the constitution version and record a changelog entry
    Bump {
        /// major, minor or patch
        kind: BumpKind,
        /// Changelog summary
        #[arg(required = true)]
        summary: Vec<String>,
    },
    /// Check a spec's requirements against MUST NOT rules
    Check { id: String },
}

pub fn run(root: &Path, subcmd: ConstitutionSubcommand, json: bool) -> anyhow::Result<()> {
    paths::ensure_initialized(root)?;
    match subcmd {
        ConstitutionSubcommand::Show => show(root, json),
        ConstitutionSubcommand::Validate => validate(root, json),
        ConstitutionSubcommand::Bump { kind, summary } => bump(root, kind, &summary.join(" "), json),
        ConstitutionSubcommand::Check { id } => check(root, &id, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let c = constitution::load(root)?;
    if json {
        return print_json(&c);
    }
    println!("{} (v{})", c.title, c.version);
    if let Some(updated) = &c.updated {
        println!("  updated: {updated}");
    }
    for p in &c.principles {
        println!("\n{}. {}", p.number, p.name);
        for r in &p.rules {
            println!("  - {}", r.text);
        }
    }
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let c = constitution::load(root)?;
    let problems = constitution::validate(&c);
    if json {
        print_json(&serde_json::json!({
            "version": c.version.to_string(),
            "valid": problems.is_empty(),
            "problems": problems,
        }))?;
    } else {
        println!("{} constitution v{}", mark(problems.is_empty()), c.version);
        for p in &problems {
            println!("    {p}");
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailed(format!("constitution has {} problem(s)", problems.len())).into())
    }
}

fn bump(root: &Path, kind: BumpKind, summary: &str, json: bool) -> anyhow::Result<()> {
    let today = chrono::Local::now().date_naive();
    let result = constitution::bump(root, kind, summary, today)
        .context("cannot bump constitution version")?;
    if json {
        return print_json(&result);
    }
    println!("Constitution {} -> {} ({})", result.from, result.to, result.date);
    println!("  updated: {}", paths::CONSTITUTION_CHANGELOG);
    Ok(())
}

fn check(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let c = constitution::load(root)?;
    let spec = Spec::load(root, id)?;
    let violations = constitution::check_spec(&c, &spec);
    if json {
        print_json(&serde_json::json!({
            "id": spec.id,
            "compliant": violations.is_empty(),
            "violations": violations,
        }))?;
    } else {
        println!("{} {}", mark(violations.is_empty()), spec.id);
        for v in &violations {
            println!(
                "    {} mentions '{}' ({}: {})",
                v.requirement, v.term, v.principle, v.rule
            );
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailed(format!(
            "{} violates the constitution in {} place(s)",
            spec.id,
            violations.len()
        ))
        .into())
    }
}
