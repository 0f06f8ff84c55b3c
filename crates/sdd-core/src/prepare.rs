use crate::change;
use crate::config::Config;
use crate::constitution;
use crate::error::Result;
use crate::feature::{self, FeaturePhase};
use crate::paths;
use crate::spec::Spec;
use crate::tasks::{self, TaskProgress, TaskStatus};
use crate::validate::{self, ValidateOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Check
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareReport {
    pub feature: String,
    pub title: String,
    pub phase: FeaturePhase,
    pub checks: Vec<Check>,
    pub next_step: String,
}

impl PrepareReport {
    pub fn is_ready(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

// ---------------------------------------------------------------------------
// prepare
// ---------------------------------------------------------------------------

/// Readiness of a feature for its next workflow step.
pub fn prepare(root: &Path, id: &str) -> Result<PrepareReport> {
    paths::ensure_initialized(root)?;
    let spec = Spec::load(root, id)?;
    let cfg = Config::load_or_default(root);
    let opts = ValidateOptions {
        strict: cfg.validation.strict,
        require_scenarios: cfg.validation.require_scenarios,
    };

    let mut checks = vec![Check::new(
        "spec exists",
        true,
        paths::display_rel(root, &paths::spec_file(root, id)),
    )];

    let report = validate::validate_file(root, &paths::spec_file(root, id), &opts)?;
    let errors = report.errors().count();
    let warnings = report.warnings().count();
    let spec_valid = report.is_valid(opts.strict);
    checks.push(Check::new(
        "spec validates",
        spec_valid,
        format!("{errors} error(s), {warnings} warning(s)"),
    ));

    match constitution::load(root) {
        Ok(c) => {
            let violations = constitution::check_spec(&c, &spec);
            let detail = match violations.first() {
                None => format!("v{}", c.version),
                Some(v) => format!(
                    "{} conflicts with principle {} ('{}')",
                    v.requirement, v.principle, v.term
                ),
            };
            checks.push(Check::new("constitution", violations.is_empty(), detail));
        }
        Err(e) => checks.push(Check::new("constitution", false, e.to_string())),
    }

    let mut waiting = Vec::new();
    for dep in spec.depends_on() {
        match Spec::load(root, dep) {
            Ok(d) if d.status().is_some_and(|s| s.is_settled()) => {}
            Ok(d) => waiting.push(format!("{dep} ({})", d.status_str())),
            Err(_) => waiting.push(format!("{dep} (missing)")),
        }
    }
    checks.push(Check::new(
        "dependencies approved",
        waiting.is_empty(),
        if waiting.is_empty() {
            format!("{} dependency(ies)", spec.depends_on().len())
        } else {
            waiting.join(", ")
        },
    ));

    let has_plan = paths::plan_file(root, id).exists();
    checks.push(Check::new(
        "plan exists",
        has_plan,
        if has_plan { "plan.md" } else { "missing" },
    ));

    let items = tasks::load_tasks(root, id)?;
    checks.push(match &items {
        Some(items) => {
            let p = TaskProgress::of(items);
            Check::new(
                "tasks exist",
                true,
                format!("{}/{} done ({}%)", p.done, p.total, p.percent),
            )
        }
        None => Check::new("tasks exist", false, "missing"),
    });

    let pending = change::pending_changes_for(root, id)?;
    checks.push(Check::new(
        "no pending changes",
        pending.is_empty(),
        if pending.is_empty() {
            "none".to_string()
        } else {
            pending.join(", ")
        },
    ));

    let next_step = if !spec_valid {
        format!("fix validation findings: sdd validate {id}")
    } else if !waiting.is_empty() {
        format!("wait for dependencies: {}", waiting.join(", "))
    } else if !has_plan {
        format!("sdd plan {id}")
    } else {
        match &items {
            None => format!("sdd tasks {id}"),
            Some(items) => match items.iter().find(|t| t.status != TaskStatus::Done) {
                Some(t) => format!("implement {}: {}", t.id, t.title),
                None => format!("mark implemented: sdd status {id} --set implemented"),
            },
        }
    };

    Ok(PrepareReport {
        feature: id.to_string(),
        title: spec.title.clone(),
        phase: feature::phase_of(root, &spec)?,
        checks,
        next_step,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
