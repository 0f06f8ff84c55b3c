//! Spec ↔ code synchronisation.
//!
//! Source and test files are scanned for `REQ-xxx` references; the matcher
//! cross-references them with parsed requirements and computes the share of
//! requirements that have at least one reference.

use crate::config::SyncConfig;
use crate::error::Result;
use crate::paths;
use crate::spec::{self, Requirement, Spec};
use crate::validate::id_matches;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Code,
    Test,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeReference {
    pub req_id: String,
    /// Path relative to the project root, `/`-separated.
    pub file: String,
    pub line: usize,
    pub kind: RefKind,
    pub snippet: String,
}

static REQ_REF_RE: OnceLock<Regex> = OnceLock::new();

fn req_ref_re() -> &'static Regex {
    REQ_REF_RE.get_or_init(|| Regex::new(r"\bREQ-(?:[A-Z0-9]*[A-Z][A-Z0-9]*-)*\d+\b").unwrap())
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Find every `REQ-xxx` mention in the configured source and test dirs.
pub fn scan_references(root: &Path, cfg: &SyncConfig) -> Result<Vec<CodeReference>> {
    let mut refs = Vec::new();
    let mut visited: HashSet<std::path::PathBuf> = HashSet::new();

    let dirs = cfg
        .test_dirs
        .iter()
        .map(|d| (d, true))
        .chain(cfg.source_dirs.iter().map(|d| (d, false)));

    for (dir, is_test_dir) in dirs {
        let base = root.join(dir);
        if !base.exists() {
            tracing::debug!(dir = %base.display(), "sync dir missing, skipping");
            continue;
        }
        let walker = WalkDir::new(&base).into_iter().filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && cfg
                        .exclude
                        .iter()
                        .any(|x| e.file_name().to_string_lossy() == x.as_str()))
        });
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !has_extension(path, &cfg.extensions) || !visited.insert(path.to_path_buf()) {
                continue;
            }
            let content = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "unreadable file: {e}");
                    continue;
                }
            };
            // Classify by the project-relative path only.
            let rel_path = path.strip_prefix(root).unwrap_or(path);
            let kind = if is_test_dir || is_test_file(rel_path) {
                RefKind::Test
            } else {
                RefKind::Code
            };
            let rel = paths::display_rel(root, path);
            refs.extend(references_in(&content, &rel, kind));
        }
    }
    tracing::debug!(count = refs.len(), "scanned requirement references");
    Ok(refs)
}

/// Requirement references in one file's content.
pub fn references_in(content: &str, file: &str, kind: RefKind) -> Vec<CodeReference> {
    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        for m in req_ref_re().find_iter(line) {
            out.push(CodeReference {
                req_id: m.as_str().to_string(),
                file: file.to_string(),
                line: idx + 1,
                kind,
                snippet: crate::io::truncate_chars(line.trim(), 120).to_string(),
            });
        }
    }
    out
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// `test_*`, `*_test.*`, `*.test.*`, `*.spec.*`, or anything under a
/// `tests` / `__tests__` directory.
pub fn is_test_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let stem = name.split('.').next().unwrap_or("");
    if stem.starts_with("test_") || stem.ends_with("_test") || stem.ends_with("_tests") {
        return true;
    }
    if name.contains(".test.") || name.contains(".spec.") {
        return true;
    }
    path.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        s == "tests" || s == "__tests__" || s == "test"
    })
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementSync {
    pub id: String,
    pub spec: String,
    pub description: String,
    pub code_refs: Vec<CodeReference>,
    pub test_refs: Vec<CodeReference>,
}

impl RequirementSync {
    pub fn is_implemented(&self) -> bool {
        !self.code_refs.is_empty() || !self.test_refs.is_empty()
    }

    pub fn is_tested(&self) -> bool {
        !self.test_refs.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub total: usize,
    pub implemented: usize,
    pub tested: usize,
    pub sync_rate: f64,
    pub requirements: Vec<RequirementSync>,
    pub missing: Vec<String>,
    /// References to requirement ids no spec defines.
    pub orphans: Vec<CodeReference>,
}

pub struct SyncMatcher;

impl SyncMatcher {
    /// Match `(spec_id, requirement)` pairs against scanned references.
    pub fn match_refs(requirements: &[(String, Requirement)], refs: &[CodeReference]) -> SyncResult {
        let mut by_id: BTreeMap<&str, Vec<&CodeReference>> = BTreeMap::new();
        for r in refs {
            by_id.entry(r.req_id.as_str()).or_default().push(r);
        }

        let known: HashSet<&str> = requirements.iter().map(|(_, r)| r.id.as_str()).collect();
        let mut rows = Vec::with_capacity(requirements.len());
        for (spec_id, req) in requirements {
            let matched = by_id.get(req.id.as_str()).cloned().unwrap_or_default();
            let (tests, code): (Vec<&CodeReference>, Vec<&CodeReference>) =
                matched.into_iter().partition(|r| r.kind == RefKind::Test);
            rows.push(RequirementSync {
                id: req.id.clone(),
                spec: spec_id.clone(),
                description: req.description.clone(),
                code_refs: code.into_iter().cloned().collect(),
                test_refs: tests.into_iter().cloned().collect(),
            });
        }

        let total = rows.len();
        let implemented = rows.iter().filter(|r| r.is_implemented()).count();
        let tested = rows.iter().filter(|r| r.is_tested()).count();
        let missing = rows
            .iter()
            .filter(|r| !r.is_implemented())
            .map(|r| r.id.clone())
            .collect();
        let orphans = refs
            .iter()
            .filter(|r| !known.contains(r.req_id.as_str()))
            .cloned()
            .collect();

        SyncResult {
            total,
            implemented,
            tested,
            sync_rate: sync_rate(implemented, total),
            requirements: rows,
            missing,
            orphans,
        }
    }
}

/// `implemented / total * 100` rounded to two decimals; 100 when there is
/// nothing to implement.
pub fn sync_rate(implemented: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let rate = implemented as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Sync every spec (or those under `spec_filter`) against the code tree.
pub fn sync_project(root: &Path, cfg: &SyncConfig, spec_filter: Option<&str>) -> Result<SyncResult> {
    paths::ensure_initialized(root)?;
    let specs: Vec<Spec> = spec::load_all(root)?
        .into_iter()
        .filter(|s| spec_filter.map(|f| id_matches(&s.id, f)).unwrap_or(true))
        .collect();
    let requirements: Vec<(String, Requirement)> = specs
        .iter()
        .flat_map(|s| s.requirements.iter().map(move |r| (s.id.clone(), r.clone())))
        .collect();
    let refs = scan_references(root, cfg)?;
    let mut result = SyncMatcher::match_refs(&requirements, &refs);
    if spec_filter.is_some() {
        // Other specs' requirements are not orphans.
        let all_ids: HashSet<String> = spec::load_all(root)?
            .iter()
            .flat_map(|s| s.requirements.iter().map(|r| r.id.clone()))
            .collect();
        result.orphans.retain(|r| !all_ids.contains(&r.req_id));
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
