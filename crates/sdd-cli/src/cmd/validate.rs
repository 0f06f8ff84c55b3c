use super::ValidationFailed;
use crate::output::{mark, print_json};
use anyhow::Context as _;
use sdd_core::{
    config::Config,
    context::Context,
    paths,
    validate::{self, IssueSeverity, ProjectValidation, ValidateOptions},
};
use std::path::{Path, PathBuf};

/// A target naming an existing markdown file, relative to cwd or the root.
fn as_file(root: &Path, target: &str) -> Option<PathBuf> {
    let p = Path::new(target);
    if !target.ends_with(".md") {
        return None;
    }
    [p.to_path_buf(), root.join(p)].into_iter().find(|c| c.is_file())
}

pub fn run(root: &Path, target: Option<&str>, strict: bool, json: bool) -> anyhow::Result<()> {
    paths::ensure_initialized(root)?;
    let cfg = Config::load_or_default(root);
    let opts = ValidateOptions {
        strict: strict || cfg.validation.strict,
        require_scenarios: cfg.validation.require_scenarios,
    };

    let result = match target.and_then(|t| as_file(root, t)) {
        Some(file) => ProjectValidation {
            reports: vec![validate::validate_file(root, &file, &opts)
                .with_context(|| format!("cannot read {}", file.display()))?],
            strict: opts.strict,
        },
        None => {
            let ctx = Context::load(root)?;
            let prefix = target.map(str::to_string).or(ctx.active_domain);
            validate::validate_project(root, prefix.as_deref(), &opts)?
        }
    };

    if let Some(t) = target {
        if result.reports.is_empty() {
            return Err(sdd_core::SddError::FeatureNotFound(t.to_string()).into());
        }
    }

    if json {
        print_json(&serde_json::json!({
            "valid": result.is_valid(),
            "errors": result.error_count(),
            "warnings": result.warning_count(),
            "reports": result.reports,
        }))?;
    } else {
        if result.reports.is_empty() {
            println!("No specs found. Create one with 'sdd new <name>'.");
        }
        for r in &result.reports {
            let name = r
                .id
                .clone()
                .unwrap_or_else(|| paths::display_rel(root, &r.path));
            println!("{} {name}", mark(r.is_valid(opts.strict)));
            for issue in &r.issues {
                let sev = match issue.severity {
                    IssueSeverity::Error => "error",
                    IssueSeverity::Warning => "warning",
                };
                let line = issue.line.map(|l| format!(" line {l}")).unwrap_or_default();
                println!("    {sev}[{}]{line}: {}", issue.code, issue.message);
            }
        }
        println!(
            "\n{} spec(s), {} error(s), {} warning(s)",
            result.reports.len(),
            result.error_count(),
            result.warning_count()
        );
    }

    if result.is_valid() {
        Ok(())
    } else {
        Err(ValidationFailed(format!(
            "validation failed: {} error(s), {} warning(s)",
            result.error_count(),
            result.warning_count()
        ))
        .into())
    }
}
