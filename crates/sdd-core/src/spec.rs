//! Spec document model and parser.
//!
//! A spec is markdown with YAML frontmatter. Requirements are either explicit
//! `### REQ-xxx: Title` blocks or any other line carrying an uppercase RFC 2119
//! keyword. Scenarios are `### Scenario: name` blocks made of GIVEN / WHEN /
//! THEN / AND lines.

use crate::error::{Result, SddError};
use crate::frontmatter::{self, Frontmatter};
use crate::paths;
use crate::types::{RequirementLevel, SpecStatus};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub level: Option<RequirementLevel>,
    pub description: String,
    /// 1-based line in the source document.
    pub line: usize,
    /// Declared with a `REQ-` heading rather than inferred from a keyword line.
    #[serde(default)]
    pub explicit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub given: Vec<String>,
    pub when: String,
    pub then: Vec<String>,
    pub line: usize,
}

impl Scenario {
    fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            given: Vec::new(),
            when: String::new(),
            then: Vec::new(),
            line,
        }
    }

    /// Has at least a WHEN and a THEN clause.
    pub fn is_usable(&self) -> bool {
        !self.when.is_empty() && !self.then.is_empty()
    }

    /// Has all three of GIVEN, WHEN and THEN.
    pub fn is_complete(&self) -> bool {
        !self.given.is_empty() && self.is_usable()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub frontmatter: Frontmatter,
    pub title: String,
    pub description: String,
    pub requirements: Vec<Requirement>,
    pub scenarios: Vec<Scenario>,
}

impl Spec {
    pub fn status(&self) -> Option<SpecStatus> {
        self.frontmatter
            .status
            .as_deref()
            .and_then(|s| SpecStatus::from_str(s).ok())
    }

    pub fn status_str(&self) -> &str {
        self.frontmatter.status.as_deref().unwrap_or("unknown")
    }

    pub fn depends_on(&self) -> &[String] {
        &self.frontmatter.depends_on
    }

    pub fn requirement(&self, id: &str) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.id == id)
    }

    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn has_keyword(&self) -> bool {
        self.requirements.iter().any(|r| r.level.is_some())
    }

    pub fn has_scenario(&self) -> bool {
        self.scenarios.iter().any(Scenario::is_usable)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Load and leniently parse `.sdd/specs/<id>/spec.md`.
    pub fn load(root: &Path, id: &str) -> Result<Self> {
        let path = paths::spec_file(root, id);
        if !path.exists() {
            return Err(SddError::FeatureNotFound(id.to_string()));
        }
        Self::load_path(root, &path)
    }

    pub fn load_path(root: &Path, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut spec = parse_spec_lenient(&content)?;
        if let Some(id) = paths::spec_id_for(root, path) {
            spec.id = id;
        }
        spec.path = Some(path.to_path_buf());
        Ok(spec)
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Every `spec.md` under `.sdd/specs`, sorted by path.
pub fn spec_files(root: &Path) -> Vec<PathBuf> {
    let dir = paths::specs_dir(root);
    if !dir.exists() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(&dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == paths::SPEC_MD)
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Load every spec in the project. Files with unreadable frontmatter are
/// skipped with a warning; `sdd validate` reports them.
pub fn load_all(root: &Path) -> Result<Vec<Spec>> {
    let mut specs = Vec::new();
    for path in spec_files(root) {
        match Spec::load_path(root, &path) {
            Ok(spec) => specs.push(spec),
            Err(SddError::InvalidFrontmatter(msg)) => {
                tracing::warn!(path = %path.display(), "skipping spec: {msg}");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(specs)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Patterns {
    heading: Regex,
    req_heading: Regex,
    scenario_heading: Regex,
    clause: Regex,
    list_marker: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        heading: Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap(),
        req_heading: Regex::new(r"^(REQ-[A-Za-z0-9]+(?:-[A-Za-z0-9]+)*)\s*[:.\-]?\s*(.*)$").unwrap(),
        scenario_heading: Regex::new(r"(?i)^scenario\b(?:\s+\d+)?\s*[:.\-]?\s*(.*)$").unwrap(),
        clause: Regex::new(
            r"^(?:[-*+]\s+|\d+\.\s+)?(?:\*\*|__)?(?i:(given|when|then|and|but))\b:?(?:\*\*|__)?:?\s*(.*)$",
        )
        .unwrap(),
        list_marker: Regex::new(r"^(?:[-*+]\s+(?:\[[ xX~]\]\s+)?|\d+\.\s+)").unwrap(),
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Clause {
    Given,
    When,
    Then,
}

enum Block {
    None,
    Requirement(usize),
    Scenario(usize),
}

struct Candidate {
    text: String,
    line: usize,
    level: RequirementLevel,
}

/// Parse a spec, failing with `E204` when no requirement carries an RFC 2119
/// keyword and `E205` when no scenario has WHEN and THEN clauses.
pub fn parse_spec(content: &str) -> Result<Spec> {
    let spec = parse_spec_lenient(content)?;
    if !spec.has_keyword() {
        return Err(SddError::MissingKeyword);
    }
    if !spec.has_scenario() {
        return Err(SddError::MissingScenario);
    }
    Ok(spec)
}

/// Parse a spec without the keyword / scenario checks. Only malformed
/// frontmatter is an error.
pub fn parse_spec_lenient(content: &str) -> Result<Spec> {
    let fm = frontmatter::parse(content)?.unwrap_or_default();
    Ok(parse_document(fm, content))
}

/// Parse the body of `content` with already-parsed frontmatter.
pub(crate) fn parse_document(fm: Frontmatter, content: &str) -> Spec {
    let parts = frontmatter::split(content);
    let p = patterns();

    let mut title = String::new();
    let mut description: Vec<String> = Vec::new();
    let mut collecting_description = false;
    let mut requirements: Vec<Requirement> = Vec::new();
    let mut scenarios: Vec<Scenario> = Vec::new();
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut block = Block::None;
    let mut last_clause: Option<Clause> = None;
    let mut in_fence = false;

    for (idx, raw) in parts.body.lines().enumerate() {
        let line_no = parts.body_start_line + idx + 1;
        let line = raw.trim();

        if line.starts_with("```") || line.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(caps) = p.heading.captures(line) {
            let depth = caps[1].len();
            let text = caps[2].trim();
            collecting_description = false;
            last_clause = None;
            let req = (2..=4)
                .contains(&depth)
                .then(|| p.req_heading.captures(text))
                .flatten();
            let scenario = (2..=5)
                .contains(&depth)
                .then(|| p.scenario_heading.captures(text))
                .flatten();

            if depth == 1 && title.is_empty() {
                title = text.to_string();
                collecting_description = true;
                block = Block::None;
            } else if let Some(rc) = req {
                let id = rc[1].trim_end_matches('-').to_string();
                let heading_title = rc[2].trim();
                requirements.push(Requirement {
                    id,
                    title: (!heading_title.is_empty()).then(|| heading_title.to_string()),
                    level: None,
                    description: String::new(),
                    line: line_no,
                    explicit: true,
                });
                block = Block::Requirement(requirements.len() - 1);
            } else if let Some(sc) = scenario {
                let name = sc[1].trim();
                let name = if name.is_empty() {
                    format!("Scenario {}", scenarios.len() + 1)
                } else {
                    name.to_string()
                };
                scenarios.push(Scenario::new(name, line_no));
                block = Block::Scenario(scenarios.len() - 1);
            } else {
                block = Block::None;
            }
            continue;
        }

        if collecting_description {
            if line.is_empty() {
                if !description.is_empty() {
                    collecting_description = false;
                }
            } else {
                description.push(line.to_string());
            }
        }

        if line.is_empty() {
            continue;
        }

        if let Some(cc) = p.clause.captures(line) {
            let keyword = &cc[1];
            let text = cc[2].trim().to_string();
            let in_scenario = matches!(block, Block::Scenario(_));
            if in_scenario || keyword == "GIVEN" {
                if !in_scenario {
                    scenarios.push(Scenario::new(
                        format!("Scenario {}", scenarios.len() + 1),
                        line_no,
                    ));
                    block = Block::Scenario(scenarios.len() - 1);
                    last_clause = None;
                }
                if let Block::Scenario(i) = block {
                    apply_clause(&mut scenarios[i], keyword, text, &mut last_clause);
                }
                continue;
            }
        }

        match block {
            Block::Scenario(_) => {}
            Block::Requirement(i) => {
                let req = &mut requirements[i];
                if !req.description.is_empty() {
                    req.description.push('\n');
                }
                req.description.push_str(line);
            }
            Block::None => {
                if let Some(level) = RequirementLevel::detect(line) {
                    let text = p.list_marker.replace(line, "").trim().to_string();
                    candidates.push(Candidate {
                        text,
                        line: line_no,
                        level,
                    });
                }
            }
        }
    }

    for req in requirements.iter_mut() {
        req.level = RequirementLevel::detect(&req.description)
            .or_else(|| req.title.as_deref().and_then(RequirementLevel::detect));
    }

    let mut taken: HashSet<String> = requirements.iter().map(|r| r.id.clone()).collect();
    let mut seq = 1;
    for cand in candidates {
        let id = loop {
            let id = format!("REQ-{seq:03}");
            seq += 1;
            if !taken.contains(&id) {
                break id;
            }
        };
        taken.insert(id.clone());
        requirements.push(Requirement {
            id,
            title: None,
            level: Some(cand.level),
            description: cand.text,
            line: cand.line,
            explicit: false,
        });
    }
    requirements.sort_by_key(|r| r.line);

    let id = fm.id.clone().unwrap_or_default();
    Spec {
        id,
        path: None,
        frontmatter: fm,
        title,
        description: description.join(" "),
        requirements,
        scenarios,
    }
}

fn apply_clause(
    scenario: &mut Scenario,
    keyword: &str,
    text: String,
    last: &mut Option<Clause>,
) {
    match keyword.to_ascii_uppercase().as_str() {
        "GIVEN" => {
            scenario.given.push(text);
            *last = Some(Clause::Given);
        }
        "WHEN" => {
            if scenario.when.is_empty() {
                scenario.when = text;
            } else {
                scenario.when = format!("{} and {}", scenario.when, text);
            }
            *last = Some(Clause::When);
        }
        "THEN" => {
            scenario.then.push(text);
            *last = Some(Clause::Then);
        }
        // AND / BUT continue the previous clause
        _ => match last.unwrap_or(Clause::Given) {
            Clause::Given => scenario.given.push(text),
            Clause::When => scenario.when = format!("{} and {}", scenario.when, text),
            Clause::Then => scenario.then.push(text),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "\
---
status: draft
created: 2026-01-05
---
# User Login

Users authenticate with email and password.

## Requirements

### REQ-001: Password login
The system SHALL authenticate users with email and password.

### REQ-002: Lockout
The system SHOULD lock accounts after five failed attempts.

## Scenarios

### Scenario: Successful login
- **GIVEN** a registered user
- **AND** the account is active
- **WHEN** valid credentials are submitted
- **THEN** a session is created
- **AND** the user is redirected to the dashboard
";

    #[test]
    fn parses_valid_spec() {
        let spec = parse_spec(VALID).unwrap();
        assert_eq!(spec.title, "User Login");
        assert_eq!(spec.description, "Users authenticate with email and password.");
        assert_eq!(spec.status(), Some(SpecStatus::Draft));
        assert_eq!(spec.requirements.len(), 2);
        assert_eq!(spec.requirements[0].id, "REQ-001");
        assert_eq!(spec.requirements[0].level, Some(RequirementLevel::Shall));
        assert_eq!(spec.requirements[0].line, 11);
        assert_eq!(spec.requirements[1].level, Some(RequirementLevel::Should));

        let sc = &spec.scenarios[0];
        assert_eq!(sc.name, "Successful login");
        assert_eq!(sc.given, vec!["a registered user", "the account is active"]);
        assert_eq!(sc.when, "valid credentials are submitted");
        assert_eq!(sc.then.len(), 2);
        assert!(sc.is_complete());
    }

    #[test]
    fn missing_keyword_is_e204() {
        let content = VALID.replace("SHALL", "will").replace("SHOULD", "could");
        let err = parse_spec(&content).unwrap_err();
        assert_eq!(err.code(), "E204");
    }

    #[test]
    fn missing_scenario_is_e205() {
        let content = VALID.split("## Scenarios").next().unwrap().to_string();
        let err = parse_spec(&content).unwrap_err();
        assert_eq!(err.code(), "E205");
    }

    #[test]
    fn implicit_requirements_get_sequential_ids() {
        let content = "\
# Notes

- The API MUST validate tokens.
- Clients MAY cache responses.

### REQ-001: Explicit
The server SHALL log requests.
";
        let spec = parse_spec_lenient(content).unwrap();
        let ids: Vec<_> = spec.requirements.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["REQ-002", "REQ-003", "REQ-001"]);
        assert_eq!(spec.requirements[0].description, "The API MUST validate tokens.");
        assert!(!spec.requirements[0].explicit);
        assert!(spec.requirements[2].explicit);
    }

    #[test]
    fn code_fences_are_ignored() {
        let content = "# T\n\n```\nThe system SHALL not count\nGIVEN nothing\n```\n";
        let spec = parse_spec_lenient(content).unwrap();
        assert!(spec.requirements.is_empty());
        assert!(spec.scenarios.is_empty());
    }

    #[test]
    fn anonymous_scenario_from_bare_given() {
        let content = "# T\n\nThe system MUST work.\n\nGIVEN a user\nWHEN they act\nTHEN it works\n";
        let spec = parse_spec(content).unwrap();
        assert_eq!(spec.scenarios.len(), 1);
        assert_eq!(spec.scenarios[0].name, "Scenario 1");
        assert_eq!(spec.scenarios[0].when, "they act");
    }

    #[test]
    fn scenario_clauses_do_not_become_requirements() {
        let content = "# T\n\n### Scenario: s\nGiven x\nWhen y\nThen the system SHALL respond\n";
        let spec = parse_spec_lenient(content).unwrap();
        assert!(spec.requirements.is_empty());
        assert_eq!(spec.scenarios[0].then, vec!["the system SHALL respond"]);
    }

    #[test]
    fn keywordless_explicit_block_has_no_level() {
        let content = "# T\n\n### REQ-010: Vague\nSomething happens.\n";
        let spec = parse_spec_lenient(content).unwrap();
        assert_eq!(spec.requirements[0].level, None);
        assert!(!spec.has_keyword());
    }

    #[test]
    fn heading_depth_bounds_requirements_and_scenarios() {
        let content = "# T\n\n#### REQ-001: Kept\nThe system SHALL work.\n\n\
                       ##### REQ-009: Too deep\nNotes.\n\n\
                       ##### Scenario: Kept\nWHEN x\nTHEN y\n\n\
                       ###### Scenario: Too deep\nWHEN a\nTHEN b\n";
        let spec = parse_spec_lenient(content).unwrap();
        let ids: Vec<_> = spec.requirements.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["REQ-001"]);
        assert_eq!(spec.scenarios.len(), 1);
        assert_eq!(spec.scenarios[0].name, "Kept");
    }

    #[test]
    fn load_all_assigns_ids_from_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = paths::spec_file(dir.path(), "auth/login");
        crate::io::atomic_write(&path, VALID.as_bytes()).unwrap();
        let specs = load_all(dir.path()).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].id, "auth/login");
    }
}
