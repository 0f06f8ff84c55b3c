//! Project-wide status report.

use crate::config::Config;
use crate::error::Result;
use crate::export::{self, ExportFormat};
use crate::feature;
use crate::sync;
use crate::validate::{self, ValidateOptions};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Totals {
    pub specs: usize,
    pub requirements: usize,
    pub scenarios: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecReportRow {
    pub id: String,
    pub title: String,
    pub status: String,
    pub phase: String,
    pub requirements: usize,
    pub scenarios: usize,
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationCounts {
    pub errors: usize,
    pub warnings: usize,
    pub valid_specs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub implemented: usize,
    pub tested: usize,
    pub sync_rate: f64,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub project: String,
    pub generated_at: DateTime<Utc>,
    pub totals: Totals,
    pub by_status: BTreeMap<String, usize>,
    pub specs: Vec<SpecReportRow>,
    pub validation: ValidationCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncSummary>,
}

pub fn build_report(root: &Path, cfg: &Config, with_sync: bool) -> Result<ProjectReport> {
    let summaries = feature::list_specs(root)?;
    let opts = ValidateOptions {
        strict: cfg.validation.strict,
        require_scenarios: cfg.validation.require_scenarios,
    };
    let validation = validate::validate_project(root, None, &opts)?;

    let mut report = ProjectReport {
        project: cfg.project.name.clone(),
        generated_at: Utc::now(),
        totals: Totals::default(),
        by_status: BTreeMap::new(),
        specs: Vec::with_capacity(summaries.len()),
        validation: ValidationCounts::default(),
        sync: None,
    };

    for s in summaries {
        let (errors, warnings) = validation
            .reports
            .iter()
            .find(|r| r.id.as_deref() == Some(s.id.as_str()))
            .map(|r| (r.errors().count(), r.warnings().count()))
            .unwrap_or((0, 0));
        report.totals.specs += 1;
        report.totals.requirements += s.requirements;
        report.totals.scenarios += s.scenarios;
        *report.by_status.entry(s.status.clone()).or_insert(0) += 1;
        report.validation.errors += errors;
        report.validation.warnings += warnings;
        if errors == 0 && (!opts.strict || warnings == 0) {
            report.validation.valid_specs += 1;
        }
        report.specs.push(SpecReportRow {
            id: s.id,
            title: s.title,
            status: s.status,
            phase: s.phase.to_string(),
            requirements: s.requirements,
            scenarios: s.scenarios,
            errors,
            warnings,
        });
    }

    if with_sync {
        let r = sync::sync_project(root, &cfg.sync, None)?;
        report.sync = Some(SyncSummary {
            total: r.total,
            implemented: r.implemented,
            tested: r.tested,
            sync_rate: r.sync_rate,
            missing: r.missing,
        });
    }
    Ok(report)
}

pub(crate) const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{project}} spec report</title>
<style>{{{style}}}</style>
</head>
<body>
<h1>{{project}} spec report</h1>
<p>Generated {{generated_at}}</p>
<table>
<tr><th>Specs</th><th>Requirements</th><th>Scenarios</th><th>Errors</th><th>Warnings</th></tr>
<tr><td>{{totals.specs}}</td><td>{{totals.requirements}}</td><td>{{totals.scenarios}}</td><td>{{validation.errors}}</td><td>{{validation.warnings}}</td></tr>
</table>
<h2>By status</h2>
<ul>
{{#each by_status}}<li>{{@key}}: {{this}}</li>
{{/each}}</ul>
{{#if sync}}
<h2>Sync</h2>
<p>{{sync.implemented}} of {{sync.total}} requirements implemented ({{sync.sync_rate}}%), {{sync.tested}} tested.</p>
{{/if}}
<h2>Specs</h2>
<table>
<tr><th>ID</th><th>Title</th><th>Status</th><th>Phase</th><th>Reqs</th><th>Scenarios</th><th>Errors</th><th>Warnings</th></tr>
{{#each specs}}<tr><td>{{id}}</td><td>{{title}}</td><td>{{status}}</td><td>{{phase}}</td><td>{{requirements}}</td><td>{{scenarios}}</td><td>{{errors}}</td><td>{{warnings}}</td></tr>
{{/each}}</table>
</body>
</html>
"#;

fn markdown(r: &ProjectReport) -> String {
    let title = if r.project.is_empty() {
        "Spec report".to_string()
    } else {
        format!("{} spec report", r.project)
    };
    let mut out = format!(
        "# {title}\n\nGenerated {}\n\n",
        r.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    out.push_str(&format!(
        "- Specs: {}\n- Requirements: {}\n- Scenarios: {}\n- Validation: {} error(s), {} warning(s)\n",
        r.totals.specs,
        r.totals.requirements,
        r.totals.scenarios,
        r.validation.errors,
        r.validation.warnings
    ));
    if let Some(s) = &r.sync {
        out.push_str(&format!(
            "- Sync: {}/{} implemented ({:.2}%), {} tested\n",
            s.implemented, s.total, s.sync_rate, s.tested
        ));
    }
    out.push_str("\n## By status\n\n");
    for (status, n) in &r.by_status {
        out.push_str(&format!("- {status}: {n}\n"));
    }
    out.push_str("\n## Specs\n\n| ID | Title | Status | Phase | Reqs | Scenarios | Errors | Warnings |\n|---|---|---|---|---|---|---|---|\n");
    for s in &r.specs {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
            s.id, s.title, s.status, s.phase, s.requirements, s.scenarios, s.errors, s.warnings
        ));
    }
    out
}

pub fn render_report(r: &ProjectReport, fmt: ExportFormat) -> Result<String> {
    match fmt {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(r)?),
        ExportFormat::Markdown => Ok(markdown(r)),
        ExportFormat::Html => export::render("report", r),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{create_feature, CreateOptions};
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(crate::paths::specs_dir(dir.path())).unwrap();
        create_feature(dir.path(), "auth", &CreateOptions::default()).unwrap();
        create_feature(dir.path(), "billing", &CreateOptions::default()).unwrap();
        dir
    }

    #[test]
    fn counts_specs_and_statuses() {
        let dir = project();
        let cfg = Config::new("Demo");
        let r = build_report(dir.path(), &cfg, false).unwrap();
        assert_eq!(r.totals.specs, 2);
        assert_eq!(r.by_status.get("draft"), Some(&2));
        assert_eq!(r.validation.errors, 0);
        assert_eq!(r.validation.valid_specs, 2);
        assert!(r.sync.is_none());
    }

    #[test]
    fn renders_all_formats() {
        let dir = project();
        let r = build_report(dir.path(), &Config::new("Demo"), true).unwrap();
        assert_eq!(r.sync.as_ref().unwrap().sync_rate, 0.0);

        let md = render_report(&r, ExportFormat::Markdown).unwrap();
        assert!(md.starts_with("# Demo spec report"));
        assert!(md.contains("| auth | Auth | draft |"));

        let html = render_report(&r, ExportFormat::Html).unwrap();
        assert!(html.contains("<td>billing</td>"));
        assert!(html.contains("draft: 2"));

        let json: serde_json::Value =
            serde_json::from_str(&render_report(&r, ExportFormat::Json).unwrap()).unwrap();
        assert_eq!(json["totals"]["specs"], 2);
    }
}
