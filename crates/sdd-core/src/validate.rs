use crate::error::{Result, SddError};
use crate::frontmatter;
use crate::graph::DependencyGraph;
use crate::paths;
use crate::spec::{self, Spec};
use crate::types::SpecStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ValidationIssue {
    pub fn error(err: &SddError, line: Option<usize>) -> Self {
        Self {
            code: err.code().to_string(),
            severity: IssueSeverity::Error,
            message: err.to_string(),
            line,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            code: code.to_string(),
            severity: IssueSeverity::Warning,
            message: message.into(),
            line,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValidateOptions {
    pub strict: bool,
    pub require_scenarios: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            strict: false,
            require_scenarios: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: PathBuf,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
    }

    /// No errors, and no warnings either when `strict`.
    pub fn is_valid(&self, strict: bool) -> bool {
        self.errors().next().is_none() && (!strict || self.warnings().next().is_none())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectValidation {
    pub reports: Vec<ValidationReport>,
    pub strict: bool,
}

impl ProjectValidation {
    pub fn is_valid(&self) -> bool {
        self.reports.iter().all(|r| r.is_valid(self.strict))
    }

    pub fn error_count(&self) -> usize {
        self.reports.iter().map(|r| r.errors().count()).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.reports.iter().map(|r| r.warnings().count()).sum()
    }
}

// ---------------------------------------------------------------------------
// Single document
// ---------------------------------------------------------------------------

/// Check one spec document and return every finding.
pub fn validate_content(content: &str, opts: &ValidateOptions) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let fm = match frontmatter::parse(content) {
        Ok(Some(fm)) => Some(fm),
        Ok(None) => {
            issues.push(ValidationIssue::error(&SddError::MissingFrontmatter, Some(1)));
            None
        }
        Err(e) => {
            issues.push(ValidationIssue::error(&e, Some(1)));
            return issues;
        }
    };

    if let Some(fm) = &fm {
        match fm.status.as_deref() {
            Some(status) => {
                if let Err(e) = SpecStatus::from_str(status) {
                    issues.push(ValidationIssue::error(&e, None));
                }
            }
            None => issues.push(ValidationIssue::error(
                &SddError::InvalidStatus("<missing>".to_string()),
                None,
            )),
        }
        if fm.created.is_none() {
            issues.push(ValidationIssue::warning(
                "W203",
                "frontmatter has no 'created' date",
                None,
            ));
        }
    }

    let spec = spec::parse_document(fm.unwrap_or_default(), content);

    if spec.title.is_empty() {
        issues.push(ValidationIssue::error(&SddError::MissingTitle, None));
    } else if spec.description.is_empty() {
        issues.push(ValidationIssue::warning(
            "W201",
            "no description paragraph after the title",
            None,
        ));
    }

    if !spec.has_keyword() {
        issues.push(ValidationIssue::error(&SddError::MissingKeyword, None));
    }
    if opts.require_scenarios && !spec.has_scenario() {
        issues.push(ValidationIssue::error(&SddError::MissingScenario, None));
    }

    let mut seen = HashSet::new();
    for req in spec.requirements.iter().filter(|r| r.explicit) {
        if !seen.insert(req.id.as_str()) {
            issues.push(ValidationIssue::error(
                &SddError::DuplicateRequirement(req.id.clone()),
                Some(req.line),
            ));
        }
        if req.level.is_none() {
            issues.push(ValidationIssue::warning(
                "W204",
                format!("{} has no RFC 2119 keyword", req.id),
                Some(req.line),
            ));
        }
    }

    for sc in &spec.scenarios {
        if !sc.is_complete() {
            issues.push(ValidationIssue::warning(
                "W202",
                format!("scenario '{}' is missing GIVEN, WHEN or THEN", sc.name),
                Some(sc.line),
            ));
        }
    }

    issues
}

pub fn validate_file(root: &Path, path: &Path, opts: &ValidateOptions) -> Result<ValidationReport> {
    let content = std::fs::read_to_string(path)?;
    Ok(ValidationReport {
        id: paths::spec_id_for(root, path),
        path: path.to_path_buf(),
        issues: validate_content(&content, opts),
    })
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// Validate every spec whose id starts with `prefix` (all when `None`), then
/// add dependency findings from the project-wide graph.
pub fn validate_project(
    root: &Path,
    prefix: Option<&str>,
    opts: &ValidateOptions,
) -> Result<ProjectValidation> {
    paths::ensure_initialized(root)?;

    let mut reports = Vec::new();
    for path in spec::spec_files(root) {
        let id = paths::spec_id_for(root, &path).unwrap_or_default();
        if let Some(prefix) = prefix {
            if !id_matches(&id, prefix) {
                continue;
            }
        }
        reports.push(validate_file(root, &path, opts)?);
    }

    let all: Vec<Spec> = spec::load_all(root)?;
    let graph = DependencyGraph::build(&all);
    for (spec_id, dep) in graph.unknown_dependencies() {
        if let Some(report) = reports.iter_mut().find(|r| r.id.as_deref() == Some(spec_id)) {
            let err = SddError::UnknownDependency {
                spec: spec_id.to_string(),
                dependency: dep.to_string(),
            };
            report.issues.push(ValidationIssue::error(&err, None));
        }
    }
    for cycle in graph.find_cycles() {
        let err = SddError::DependencyCycle(cycle.join(" -> "));
        if let Some(report) = reports
            .iter_mut()
            .find(|r| r.id.as_deref().is_some_and(|id| cycle.iter().any(|c| c == id)))
        {
            report.issues.push(ValidationIssue::error(&err, None));
        }
    }

    Ok(ProjectValidation {
        reports,
        strict: opts.strict,
    })
}

/// `auth` matches `auth` and `auth/login`, not `authz`.
pub fn id_matches(id: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    id == prefix || id.starts_with(&format!("{prefix}/"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const GOOD: &str = "---\nstatus: draft\ncreated: 2026-01-01\n---\n# Login\n\nLogin flow.\n\n### REQ-001: Login\nThe system SHALL log users in.\n\n### Scenario: ok\n- GIVEN a user\n- WHEN they log in\n- THEN they see the dashboard\n";

    fn codes(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn clean_spec_has_no_issues() {
        assert!(validate_content(GOOD, &ValidateOptions::default()).is_empty());
    }

    #[test]
    fn reports_missing_frontmatter_and_title() {
        let issues = validate_content("The system MUST work.\n", &ValidateOptions::default());
        let c = codes(&issues);
        assert!(c.contains(&"E201"));
        assert!(c.contains(&"E203"));
        assert!(c.contains(&"E205"));
        assert!(!c.contains(&"E204"));
    }

    #[test]
    fn scenario_check_can_be_disabled() {
        let content = GOOD.split("### Scenario").next().unwrap();
        let opts = ValidateOptions {
            require_scenarios: false,
            ..Default::default()
        };
        assert!(validate_content(content, &opts).is_empty());
    }

    #[test]
    fn invalid_status_and_duplicates() {
        let content = GOOD
            .replace("status: draft", "status: someday")
            .replace("### Scenario", "### REQ-001: Again\nThe system MAY retry.\n\n### Scenario");
        let c_issues = validate_content(&content, &ValidateOptions::default());
        let c = codes(&c_issues);
        assert!(c.contains(&"E206"));
        assert!(c.contains(&"E207"));
    }

    #[test]
    fn incomplete_scenario_is_warning_only() {
        let content = GOOD.replace("- GIVEN a user\n", "");
        let issues = validate_content(&content, &ValidateOptions::default());
        assert_eq!(codes(&issues), vec!["W202"]);

        let report = ValidationReport {
            id: None,
            path: PathBuf::from("x"),
            issues,
        };
        assert!(report.is_valid(false));
        assert!(!report.is_valid(true));
    }

    #[test]
    fn project_reports_unknown_dependency() {
        let dir = TempDir::new().unwrap();
        let with_dep = GOOD.replace("status: draft", "status: draft\ndepends_on: [billing]");
        crate::io::atomic_write(&paths::spec_file(dir.path(), "auth"), with_dep.as_bytes()).unwrap();

        let result = validate_project(dir.path(), None, &ValidateOptions::default()).unwrap();
        assert_eq!(result.reports.len(), 1);
        assert!(codes(&result.reports[0].issues).contains(&"E208"));
        assert!(!result.is_valid());
    }

    #[test]
    fn prefix_matching() {
        assert!(id_matches("auth/login", "auth"));
        assert!(id_matches("auth", "auth/"));
        assert!(!id_matches("authz", "auth"));
    }
}
