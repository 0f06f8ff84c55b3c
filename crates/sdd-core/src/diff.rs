//! Structural diff of specs: requirements by id, scenarios by name, and
//! frontmatter metadata, with a semver-like severity for each change.

use crate::error::Result;
use crate::git;
use crate::paths;
use crate::spec::{self, Requirement, Scenario, Spec};
use crate::types::RequirementLevel;
use crate::validate::id_matches;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl ChangeKind {
    fn symbol(self) -> char {
        match self {
            ChangeKind::Added => '+',
            ChangeKind::Removed => '-',
            ChangeKind::Modified => '~',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordImpact {
    Strengthened,
    Weakened,
    Changed,
}

impl std::fmt::Display for KeywordImpact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            KeywordImpact::Strengthened => "strengthened",
            KeywordImpact::Weakened => "weakened",
            KeywordImpact::Changed => "changed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordChange {
    pub from: Option<RequirementLevel>,
    pub to: Option<RequirementLevel>,
    pub impact: KeywordImpact,
}

impl KeywordChange {
    /// `None` when the level did not change.
    pub fn classify(from: Option<RequirementLevel>, to: Option<RequirementLevel>) -> Option<Self> {
        if from == to {
            return None;
        }
        let impact = match (from, to) {
            (None, Some(_)) => KeywordImpact::Strengthened,
            (Some(_), None) => KeywordImpact::Weakened,
            (Some(a), Some(b)) if a.is_negative() != b.is_negative() => KeywordImpact::Changed,
            (Some(a), Some(b)) if b.strength() > a.strength() => KeywordImpact::Strengthened,
            (Some(a), Some(b)) if b.strength() < a.strength() => KeywordImpact::Weakened,
            _ => KeywordImpact::Changed,
        };
        Some(Self { from, to, impact })
    }

    pub fn is_polarity_flip(&self) -> bool {
        matches!((self.from, self.to), (Some(a), Some(b)) if a.is_negative() != b.is_negative())
    }

    pub fn severity(&self) -> Severity {
        match self.impact {
            KeywordImpact::Strengthened => Severity::Major,
            KeywordImpact::Weakened => Severity::Minor,
            KeywordImpact::Changed if self.is_polarity_flip() => Severity::Major,
            KeywordImpact::Changed => Severity::Patch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Patch,
    Minor,
    Major,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Patch => "patch",
            Severity::Minor => "minor",
            Severity::Major => "major",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementChange {
    pub id: String,
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<KeywordChange>,
}

impl RequirementChange {
    pub fn severity(&self) -> Severity {
        match self.kind {
            ChangeKind::Added => Severity::Minor,
            ChangeKind::Removed => Severity::Major,
            ChangeKind::Modified => self
                .keyword
                .as_ref()
                .map(KeywordChange::severity)
                .unwrap_or(Severity::Patch),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioChange {
    pub name: String,
    pub kind: ChangeKind,
}

impl ScenarioChange {
    pub fn severity(&self) -> Severity {
        match self.kind {
            ChangeKind::Added | ChangeKind::Removed => Severity::Minor,
            ChangeKind::Modified => Severity::Patch,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataChange {
    pub field: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecDiff {
    pub id: String,
    pub requirements: Vec<RequirementChange>,
    pub scenarios: Vec<ScenarioChange>,
    pub metadata: Vec<MetadataChange>,
}

impl SpecDiff {
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty() && self.scenarios.is_empty() && self.metadata.is_empty()
    }

    /// Highest severity of any change; `None` for an empty diff.
    pub fn severity(&self) -> Option<Severity> {
        let reqs = self.requirements.iter().map(RequirementChange::severity);
        let scenarios = self.scenarios.iter().map(ScenarioChange::severity);
        let meta = self.metadata.iter().map(|_| Severity::Patch);
        reqs.chain(scenarios).chain(meta).max()
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.requirements.iter().filter(|r| r.kind == kind).count()
    }
}

// ---------------------------------------------------------------------------
// Diffing
// ---------------------------------------------------------------------------

pub fn diff_specs(before: Option<&Spec>, after: Option<&Spec>) -> SpecDiff {
    let id = after
        .or(before)
        .map(|s| s.id.clone())
        .unwrap_or_default();
    let empty_reqs: Vec<Requirement> = Vec::new();
    let empty_scenarios: Vec<Scenario> = Vec::new();
    let before_reqs = before.map(|s| &s.requirements).unwrap_or(&empty_reqs);
    let after_reqs = after.map(|s| &s.requirements).unwrap_or(&empty_reqs);

    let mut requirements = Vec::new();
    let ids: BTreeSet<&str> = before_reqs
        .iter()
        .chain(after_reqs.iter())
        .map(|r| r.id.as_str())
        .collect();
    for rid in ids {
        let old = before_reqs.iter().find(|r| r.id == rid);
        let new = after_reqs.iter().find(|r| r.id == rid);
        let change = match (old, new) {
            (None, Some(n)) => RequirementChange {
                id: rid.to_string(),
                kind: ChangeKind::Added,
                before: None,
                after: Some(n.description.clone()),
                keyword: None,
            },
            (Some(o), None) => RequirementChange {
                id: rid.to_string(),
                kind: ChangeKind::Removed,
                before: Some(o.description.clone()),
                after: None,
                keyword: None,
            },
            (Some(o), Some(n)) => {
                if o.description == n.description && o.title == n.title && o.level == n.level {
                    continue;
                }
                RequirementChange {
                    id: rid.to_string(),
                    kind: ChangeKind::Modified,
                    before: Some(o.description.clone()),
                    after: Some(n.description.clone()),
                    keyword: KeywordChange::classify(o.level, n.level),
                }
            }
            (None, None) => continue,
        };
        requirements.push(change);
    }

    let before_sc = before.map(|s| &s.scenarios).unwrap_or(&empty_scenarios);
    let after_sc = after.map(|s| &s.scenarios).unwrap_or(&empty_scenarios);
    let mut scenarios = Vec::new();
    let names: BTreeSet<&str> = before_sc
        .iter()
        .chain(after_sc.iter())
        .map(|s| s.name.as_str())
        .collect();
    for name in names {
        let old = before_sc.iter().find(|s| s.name == name);
        let new = after_sc.iter().find(|s| s.name == name);
        let kind = match (old, new) {
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), None) => ChangeKind::Removed,
            (Some(o), Some(n)) if o.given != n.given || o.when != n.when || o.then != n.then => {
                ChangeKind::Modified
            }
            _ => continue,
        };
        scenarios.push(ScenarioChange {
            name: name.to_string(),
            kind,
        });
    }

    let mut metadata = Vec::new();
    if let (Some(b), Some(a)) = (before, after) {
        let mut field = |name: &str, old: String, new: String| {
            if old != new {
                metadata.push(MetadataChange {
                    field: name.to_string(),
                    before: old,
                    after: new,
                });
            }
        };
        field("status", b.status_str().to_string(), a.status_str().to_string());
        field("title", b.title.clone(), a.title.clone());
        field("depends_on", b.depends_on().join(", "), a.depends_on().join(", "));
    }

    SpecDiff {
        id,
        requirements,
        scenarios,
        metadata,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDiff {
    pub from: String,
    pub to: String,
    pub specs: Vec<SpecDiff>,
}

impl ProjectDiff {
    pub fn severity(&self) -> Option<Severity> {
        self.specs.iter().filter_map(SpecDiff::severity).max()
    }
}

/// Diff every spec file changed between two revisions. `to` may be
/// [`git::WORKTREE`].
pub fn diff_project(root: &Path, from: &str, to: &str, filter: Option<&str>) -> Result<ProjectDiff> {
    paths::ensure_initialized(root)?;
    git::ensure_repo(root)?;

    let mut specs = Vec::new();
    for file in git::changed_files(root, from, to, paths::SPECS_DIR)? {
        if !file.ends_with(&format!("/{}", paths::SPEC_MD)) {
            continue;
        }
        let Some(id) = paths::spec_id_for(root, &root.join(&file)) else {
            continue;
        };
        if filter.is_some_and(|f| !id_matches(&id, f)) {
            continue;
        }
        let before = load_rev(root, from, &file, &id);
        let after = load_rev(root, to, &file, &id);
        let diff = diff_specs(before.as_ref(), after.as_ref());
        if !diff.is_empty() {
            specs.push(diff);
        }
    }

    Ok(ProjectDiff {
        from: from.to_string(),
        to: to.to_string(),
        specs,
    })
}

fn load_rev(root: &Path, rev: &str, file: &str, id: &str) -> Option<Spec> {
    let content = match git::show_file(root, rev, file) {
        Ok(c) => c?,
        Err(e) => {
            tracing::warn!(file, rev, "cannot read revision: {e}");
            return None;
        }
    };
    match spec::parse_spec_lenient(&content) {
        Ok(s) => Some(s.with_id(id)),
        Err(e) => {
            tracing::warn!(file, rev, "unparseable spec: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn level_str(level: Option<RequirementLevel>) -> &'static str {
    level.map(RequirementLevel::keyword).unwrap_or("none")
}

pub fn render_text(diff: &ProjectDiff) -> String {
    let mut out = String::new();
    if diff.specs.is_empty() {
        let _ = writeln!(out, "No spec changes between {} and {}.", diff.from, diff.to);
        return out;
    }
    for spec in &diff.specs {
        let sev = spec.severity().map(|s| s.to_string()).unwrap_or_default();
        let _ = writeln!(out, "{} [{sev}]", spec.id);
        for m in &spec.metadata {
            let _ = writeln!(out, "  ~ {}: {} -> {}", m.field, m.before, m.after);
        }
        for r in &spec.requirements {
            let _ = write!(out, "  {} {}", r.kind.symbol(), r.id);
            if let Some(k) = &r.keyword {
                let _ = write!(
                    out,
                    " ({} -> {}, {})",
                    level_str(k.from),
                    level_str(k.to),
                    k.impact
                );
            }
            out.push('\n');
        }
        for s in &spec.scenarios {
            let _ = writeln!(out, "  {} scenario: {}", s.kind.symbol(), s.name);
        }
    }
    out
}

pub fn render_stat(diff: &ProjectDiff) -> String {
    let mut out = String::new();
    for spec in &diff.specs {
        let _ = writeln!(
            out,
            "{:<32} +{} -{} ~{} scenarios:{} [{}]",
            spec.id,
            spec.count(ChangeKind::Added),
            spec.count(ChangeKind::Removed),
            spec.count(ChangeKind::Modified),
            spec.scenarios.len(),
            spec.severity().map(|s| s.to_string()).unwrap_or_default()
        );
    }
    let _ = writeln!(out, "{} spec(s) changed", diff.specs.len());
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
