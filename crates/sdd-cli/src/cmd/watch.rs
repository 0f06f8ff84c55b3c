use anyhow::Context;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use sdd_core::{
    cache::SpecCache,
    config::Config,
    paths,
    validate::{self, ValidateOptions},
    SddError,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn is_spec_doc(specs_dir: &Path, path: &Path) -> bool {
    path.starts_with(specs_dir) && path.file_name().is_some_and(|n| n == paths::SPEC_MD)
}

/// Block until interrupted, re-validating spec documents as they change.
pub fn run(root: &Path) -> anyhow::Result<()> {
    let cfg = Config::load(root)?;
    let opts = ValidateOptions {
        strict: cfg.validation.strict,
        require_scenarios: cfg.validation.require_scenarios,
    };
    let specs_dir = paths::specs_dir(root);
    let specs_dir = specs_dir.canonicalize().unwrap_or(specs_dir);
    let debounce = Duration::from_millis(cfg.watch.debounce_ms.max(1));

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(debounce, tx)
        .map_err(|e| SddError::Watch(e.to_string()))
        .context("failed to start file watcher")?;
    debouncer
        .watcher()
        .watch(&specs_dir, RecursiveMode::Recursive)
        .map_err(|e| SddError::Watch(e.to_string()))
        .with_context(|| format!("cannot watch {}", specs_dir.display()))?;

    let mut cache = SpecCache::load(root);
    println!(
        "Watching {} (debounce {}ms, Ctrl-C to stop)",
        paths::SPECS_DIR,
        debounce.as_millis()
    );

    for batch in rx {
        let events = match batch {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("watch error: {e}");
                continue;
            }
        };
        let changed: BTreeSet<PathBuf> = events
            .into_iter()
            .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
            .map(|e| e.path)
            .filter(|p| is_spec_doc(&specs_dir, p))
            .collect();

        for path in changed {
            let rel = paths::display_rel(&specs_dir, &path);
            if !path.exists() {
                cache.invalidate(&path);
                println!("- {rel} removed");
                continue;
            }
            match validate::validate_file(root, &path, &opts) {
                Ok(report) => {
                    let reqs = cache.get(root, &path).map(|s| s.requirements.len()).unwrap_or(0);
                    let errors = report.errors().count();
                    let warnings = report.warnings().count();
                    if report.is_valid(opts.strict) {
                        println!("✓ {rel}: {reqs} requirement(s), {warnings} warning(s)");
                    } else {
                        println!("✗ {rel}: {errors} error(s), {warnings} warning(s)");
                        for issue in report.issues.iter() {
                            println!("    [{}] {}", issue.code, issue.message);
                        }
                    }
                }
                Err(e) => tracing::warn!(file = %rel, "cannot validate: {e}"),
            }
        }
        if let Err(e) = cache.save(root) {
            tracing::warn!("cannot persist cache: {e}");
        }
    }
    Ok(())
}
