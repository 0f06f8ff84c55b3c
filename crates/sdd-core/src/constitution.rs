//! Project constitution: versioned principles every spec follows.

use crate::error::{Result, SddError};
use crate::frontmatter;
use crate::paths;
use crate::spec::Spec;
use crate::templates;
use crate::types::RequirementLevel;
use chrono::NaiveDate;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub level: RequirementLevel,
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principle {
    pub number: u32,
    pub name: String,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constitution {
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    pub title: String,
    pub principles: Vec<Principle>,
}

static PRINCIPLE_RE: OnceLock<Regex> = OnceLock::new();

fn principle_re() -> &'static Regex {
    PRINCIPLE_RE.get_or_init(|| Regex::new(r"^###\s+(\d+)[.):]?\s+(.+?)\s*$").unwrap())
}

fn parse_version(fm: &frontmatter::Frontmatter) -> Result<Version> {
    let raw = match fm.extra.get("version") {
        Some(serde_yaml::Value::String(s)) => s.clone(),
        Some(serde_yaml::Value::Number(n)) => n.to_string(),
        Some(_) => return Err(SddError::Constitution("version is not a string".to_string())),
        None => return Err(SddError::Constitution("frontmatter has no version".to_string())),
    };
    let normalized = match raw.matches('.').count() {
        0 => format!("{raw}.0.0"),
        1 => format!("{raw}.0"),
        _ => raw.clone(),
    };
    Version::parse(normalized.trim())
        .map_err(|e| SddError::Constitution(format!("invalid version '{raw}': {e}")))
}

pub fn parse_constitution(content: &str) -> Result<Constitution> {
    let fm = frontmatter::parse(content)?
        .ok_or_else(|| SddError::Constitution("frontmatter missing".to_string()))?;
    let version = parse_version(&fm)?;
    let parts = frontmatter::split(content);

    let mut title = String::new();
    let mut principles: Vec<Principle> = Vec::new();
    let mut in_principles = false;
    let mut saw_principles_heading = false;
    let mut current: Option<usize> = None;

    for (idx, raw) in parts.body.lines().enumerate() {
        let line = raw.trim();
        let line_no = parts.body_start_line + idx + 1;
        if let Some(t) = line.strip_prefix("# ") {
            if title.is_empty() {
                title = t.trim().to_string();
            }
            continue;
        }
        if let Some(h) = line.strip_prefix("## ") {
            in_principles = h.trim().eq_ignore_ascii_case("principles");
            saw_principles_heading |= in_principles;
            current = None;
            continue;
        }
        if let Some(c) = principle_re().captures(line) {
            if in_principles || !saw_principles_heading {
                principles.push(Principle {
                    number: c[1].parse().unwrap_or(0),
                    name: c[2].to_string(),
                    rules: Vec::new(),
                });
                current = Some(principles.len() - 1);
            } else {
                current = None;
            }
            continue;
        }
        if let (Some(i), Some(level)) = (current, RequirementLevel::detect(line)) {
            let text = line
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '+')
                .trim()
                .to_string();
            principles[i].rules.push(Rule {
                level,
                text,
                line: line_no,
            });
        }
    }

    Ok(Constitution {
        version,
        updated: fm.updated.clone().or_else(|| fm.extra_str("updated").map(str::to_string)),
        title,
        principles,
    })
}

pub fn load(root: &Path) -> Result<Constitution> {
    let path = paths::constitution_path(root);
    let content = crate::io::read_optional(&path)?.ok_or_else(|| {
        SddError::Constitution(format!(
            "{} missing: run 'sdd init'",
            paths::CONSTITUTION_FILE
        ))
    })?;
    parse_constitution(&content)
}

/// Structural problems; an empty list means the constitution is valid.
pub fn validate(c: &Constitution) -> Vec<String> {
    let mut problems = Vec::new();
    if c.principles.is_empty() {
        problems.push("no principles defined under '## Principles'".to_string());
    }
    let mut numbers = HashSet::new();
    for p in &c.principles {
        if !numbers.insert(p.number) {
            problems.push(format!("principle number {} is used twice", p.number));
        }
        if p.rules.is_empty() {
            problems.push(format!(
                "principle {}. {} has no RFC 2119 rule",
                p.number, p.name
            ));
        }
    }
    problems
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BumpKind {
    Major,
    Minor,
    Patch,
}

impl std::str::FromStr for BumpKind {
    type Err = SddError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(BumpKind::Major),
            "minor" => Ok(BumpKind::Minor),
            "patch" => Ok(BumpKind::Patch),
            _ => Err(SddError::Constitution(format!(
                "unknown bump '{s}': expected major, minor or patch"
            ))),
        }
    }
}

pub fn next_version(v: &Version, kind: BumpKind) -> Version {
    match kind {
        BumpKind::Major => Version::new(v.major + 1, 0, 0),
        BumpKind::Minor => Version::new(v.major, v.minor + 1, 0),
        BumpKind::Patch => Version::new(v.major, v.minor, v.patch + 1),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BumpResult {
    pub from: Version,
    pub to: Version,
    pub date: String,
}

/// Bump the version, stamp `updated`, and prepend a changelog entry.
pub fn bump(root: &Path, kind: BumpKind, summary: &str, today: NaiveDate) -> Result<BumpResult> {
    let path = paths::constitution_path(root);
    let content = crate::io::read_optional(&path)?
        .ok_or_else(|| SddError::Constitution("constitution.md missing".to_string()))?;
    let current = parse_constitution(&content)?;
    let to = next_version(&current.version, kind);
    let date = today.format("%Y-%m-%d").to_string();

    let updated = frontmatter::set_field(&content, "version", &to.to_string());
    let updated = frontmatter::set_field(&updated, "updated", &date);
    crate::io::atomic_write(&path, updated.as_bytes())?;

    let entry = format!("## [{to}] - {date}\n\n- {}\n\n", summary.trim());
    let log_path = paths::constitution_changelog_path(root);
    let existing = crate::io::read_optional(&log_path)?.unwrap_or_default();
    let header = templates::constitution_changelog_header();
    let rest = existing.strip_prefix(header).unwrap_or(&existing);
    let log = format!("{header}{entry}{rest}");
    crate::io::atomic_write(&log_path, log.as_bytes())?;

    tracing::info!(from = %current.version, to = %to, "constitution bumped");
    Ok(BumpResult {
        from: current.version,
        to,
        date,
    })
}

// ---------------------------------------------------------------------------
// Spec checks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub principle: String,
    pub rule: String,
    pub requirement: String,
    pub term: String,
}

const STOPWORDS: &[&str] = &[
    "about", "after", "before", "every", "their", "there", "these", "those", "which", "while",
    "without", "would", "could", "should", "shall", "other", "being", "using", "where",
];

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 5 && !w.chars().all(|c| c.is_ascii_uppercase()))
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Requirements that mention a term forbidden by a `MUST NOT` / `SHALL NOT`
/// rule.
pub fn check_spec(c: &Constitution, spec: &Spec) -> Vec<Violation> {
    let mut out = Vec::new();
    for principle in &c.principles {
        for rule in principle.rules.iter().filter(|r| r.level.is_negative()) {
            let keyword = rule.level.keyword();
            let forbidden = rule
                .text
                .find(keyword)
                .map(|i| &rule.text[i + keyword.len()..])
                .unwrap_or(&rule.text);
            let rule_terms = terms(forbidden);
            for req in &spec.requirements {
                let text = req.description.to_lowercase();
                let req_terms: HashSet<String> = terms(&text).into_iter().collect();
                if let Some(term) = rule_terms.iter().find(|t| req_terms.contains(*t)) {
                    out.push(Violation {
                        principle: format!("{}. {}", principle.number, principle.name),
                        rule: rule.text.clone(),
                        requirement: req.id.clone(),
                        term: term.clone(),
                    });
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_spec_lenient;
    use tempfile::TempDir;

    fn default_doc() -> String {
        templates::constitution("Demo", "2026-01-01")
    }

    #[test]
    fn parses_default_template() {
        let c = parse_constitution(&default_doc()).unwrap();
        assert_eq!(c.version, Version::new(1, 0, 0));
        assert_eq!(c.title, "Demo Constitution");
        assert_eq!(c.principles.len(), 3);
        assert_eq!(c.principles[0].rules.len(), 2);
        assert_eq!(c.principles[2].rules[0].level, RequirementLevel::MustNot);
        assert!(validate(&c).is_empty());
    }

    #[test]
    fn short_versions_are_normalized() {
        let c = parse_constitution("---\nversion: 2.1\n---\n# C\n").unwrap();
        assert_eq!(c.version, Version::new(2, 1, 0));
        assert!(!validate(&c).is_empty());
    }

    #[test]
    fn invalid_version_is_e701() {
        let err = parse_constitution("---\nversion: banana\n---\n# C\n").unwrap_err();
        assert_eq!(err.code(), "E701");
    }

    #[test]
    fn bump_updates_version_and_changelog() {
        let dir = TempDir::new().unwrap();
        crate::io::atomic_write(&paths::constitution_path(dir.path()), default_doc().as_bytes())
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 4, 2).unwrap();

        let r = bump(dir.path(), BumpKind::Minor, "Add security principle", day).unwrap();
        assert_eq!(r.to, Version::new(1, 1, 0));
        bump(dir.path(), BumpKind::Major, "Rewrite", day).unwrap();

        let c = load(dir.path()).unwrap();
        assert_eq!(c.version, Version::new(2, 0, 0));
        assert_eq!(c.updated.as_deref(), Some("2026-04-02"));

        let log = std::fs::read_to_string(paths::constitution_changelog_path(dir.path())).unwrap();
        assert!(log.starts_with("# Constitution Changelog\n\n## [2.0.0] - 2026-04-02"));
        assert!(log.find("[2.0.0]").unwrap() < log.find("[1.1.0]").unwrap());
    }

    #[test]
    fn versions_serialize_as_strings() {
        let r = BumpResult {
            from: Version::new(1, 0, 0),
            to: Version::new(1, 1, 0),
            date: "2026-04-02".to_string(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["from"], "1.0.0");
        assert_eq!(json["to"], "1.1.0");

        let c = parse_constitution(&default_doc()).unwrap();
        let text = serde_json::to_string(&c).unwrap();
        let back: Constitution = serde_json::from_str(&text).unwrap();
        assert_eq!(back.version, Version::new(1, 0, 0));
        assert_eq!(back.principles.len(), 3);
    }

    #[test]
    fn check_spec_flags_forbidden_terms() {
        let c = parse_constitution(
            "---\nversion: 1.0.0\n---\n# C\n\n## Principles\n\n### 1. Privacy\n- Services MUST NOT store plaintext passwords.\n",
        )
        .unwrap();
        let spec = parse_spec_lenient(
            "# Auth\n\n### REQ-001: Store\nThe system SHALL store passwords in the users table.\n",
        )
        .unwrap();
        let v = check_spec(&c, &spec);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].requirement, "REQ-001");
        assert_eq!(v[0].term, "store");
    }
}
