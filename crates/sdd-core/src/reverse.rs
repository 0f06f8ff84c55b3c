//! Reverse extraction: scan an existing source tree, guess its domains and
//! write draft specs for them.

use crate::config::Config;
use crate::error::{Result, SddError};
use crate::frontmatter;
use crate::paths;
use crate::spec;
use crate::templates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Frontmatter `source` value marking a reverse-extracted draft.
pub const EXTRACTED_SOURCE: &str = "reverse-extracted";

const GENERIC_DIRS: &[&str] = &[
    "utils", "util", "common", "lib", "shared", "helpers", "types", "internal", "core", "src",
    "pkg", "app",
];

const MAX_LISTED_FILES: usize = 25;

/// Language name for a file extension.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext.to_ascii_lowercase().as_str() {
        "ts" | "mts" | "cts" | "tsx" => "typescript",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "rs" => "rust",
        "py" | "pyi" => "python",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "scala" => "scala",
        "vue" => "vue",
        "sh" | "bash" | "zsh" => "bash",
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangStat {
    pub files: usize,
    pub lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainGuess {
    pub name: String,
    pub files: Vec<String>,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub root: PathBuf,
    pub files: usize,
    pub total_lines: usize,
    pub languages: BTreeMap<String, LangStat>,
    pub domains: Vec<DomainGuess>,
}

/// Domain for a file path relative to its source root: the first directory
/// segment that is not a generic name, or `core`.
pub fn guess_domain(rel: &Path) -> String {
    let dirs: Vec<String> = rel
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
                .collect()
        })
        .unwrap_or_default();
    dirs.into_iter()
        .find(|d| !GENERIC_DIRS.contains(&d.as_str()))
        .unwrap_or_else(|| "core".to_string())
}

/// Walk the configured source dirs (or the whole root when none exist).
pub fn scan(root: &Path, cfg: &Config) -> Result<ScanResult> {
    let mut roots: Vec<PathBuf> = cfg
        .sync
        .source_dirs
        .iter()
        .map(|d| root.join(d))
        .filter(|p| p.is_dir())
        .collect();
    if roots.is_empty() {
        roots.push(root.to_path_buf());
    }

    let ignore = &cfg.reverse.ignore_dirs;
    let mut files = 0;
    let mut total_lines = 0;
    let mut languages: BTreeMap<String, LangStat> = BTreeMap::new();
    let mut domains: BTreeMap<String, (Vec<String>, BTreeSet<String>)> = BTreeMap::new();

    for base in &roots {
        let walker = WalkDir::new(base).sort_by_file_name().into_iter().filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !ignore.iter().any(|i| i.as_str() == name)
        });
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(lang) = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(language_for_extension)
            else {
                continue;
            };
            let lines = std::fs::read_to_string(path)
                .map(|c| c.lines().count())
                .unwrap_or(0);
            files += 1;
            total_lines += lines;
            let stat = languages.entry(lang.to_string()).or_default();
            stat.files += 1;
            stat.lines += lines;

            let rel = path.strip_prefix(base).unwrap_or(path);
            let domain = guess_domain(rel);
            let slot = domains.entry(domain).or_default();
            slot.0.push(paths::display_rel(root, path));
            slot.1.insert(lang.to_string());
        }
    }

    tracing::debug!(files, total_lines, domains = domains.len(), "reverse scan");
    Ok(ScanResult {
        root: root.to_path_buf(),
        files,
        total_lines,
        languages,
        domains: domains
            .into_iter()
            .map(|(name, (files, langs))| DomainGuess {
                name,
                files,
                languages: langs.into_iter().collect(),
            })
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub at: DateTime<Utc>,
    pub files: usize,
    pub total_lines: usize,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverseMeta {
    #[serde(default)]
    pub scans: Vec<ScanRecord>,
    #[serde(default)]
    pub extracted: Vec<String>,
    #[serde(default)]
    pub finalized: Vec<String>,
}

impl ReverseMeta {
    pub fn load(root: &Path) -> Result<Self> {
        match crate::io::read_optional(&paths::reverse_meta_path(root))? {
            Some(data) if !data.trim().is_empty() => Ok(serde_json::from_str(&data)?),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(&paths::reverse_meta_path(root), data.as_bytes())
    }

    fn note(list: &mut Vec<String>, id: &str) {
        if !list.iter().any(|x| x == id) {
            list.push(id.to_string());
        }
    }
}

pub fn record_scan(root: &Path, result: &ScanResult) -> Result<()> {
    let mut meta = ReverseMeta::load(root)?;
    meta.scans.push(ScanRecord {
        at: Utc::now(),
        files: result.files,
        total_lines: result.total_lines,
        domains: result.domains.iter().map(|d| d.name.clone()).collect(),
    });
    meta.save(root)
}

// ---------------------------------------------------------------------------
// Serena detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerenaStatus {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

pub const SERENA_INSTALL_HINT: &str =
    "install with 'uvx --from git+https://github.com/oraios/serena serena-mcp-server' or set SERENA_MCP_URL";

/// Whether the Serena MCP server can be reached. Only availability is
/// checked; no semantic analysis runs in-process.
pub fn serena_status() -> SerenaStatus {
    if let Ok(url) = std::env::var("SERENA_MCP_URL") {
        if !url.trim().is_empty() {
            return SerenaStatus {
                available: true,
                via: Some(url),
            };
        }
    }
    for bin in ["serena-mcp-server", "serena"] {
        if let Ok(path) = which::which(bin) {
            return SerenaStatus {
                available: true,
                via: Some(path.display().to_string()),
            };
        }
    }
    SerenaStatus {
        available: false,
        via: None,
    }
}

// ---------------------------------------------------------------------------
// Extract / review / finalize
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Only these domains; all when empty.
    pub domains: Vec<String>,
    pub force: bool,
    pub require_serena: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractReport {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

/// `Billing API` / `billing_api` → `billing-api`.
pub fn sanitize_domain(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

fn draft_spec(domain: &DomainGuess, id: &str, today: &str) -> String {
    let mut out = format!(
        "---\nstatus: draft\ncreated: {today}\nsource: {EXTRACTED_SOURCE}\n---\n# {title}\n\nDraft spec reverse-extracted from {n} file(s) ({langs}). Review and rewrite before approval.\n\n## Requirements\n\n### {req}: Existing behaviour\nThe {id} module SHALL keep its current observable behaviour until this spec is reviewed.\n\n## Scenarios\n\n### Scenario: Current behaviour\n- GIVEN the current {id} implementation\n- WHEN its public entry points are exercised\n- THEN the results match the behaviour documented here\n\n## Source Files\n\n",
        title = crate::feature::title_from_name(id),
        req = templates::requirement_id(&templates::requirement_prefix(id), 1),
        n = domain.files.len(),
        langs = domain.languages.join(", "),
    );
    for f in domain.files.iter().take(MAX_LISTED_FILES) {
        out.push_str(&format!("- `{f}`\n"));
    }
    if domain.files.len() > MAX_LISTED_FILES {
        out.push_str(&format!(
            "- and {} more\n",
            domain.files.len() - MAX_LISTED_FILES
        ));
    }
    out
}

pub fn extract(root: &Path, scan: &ScanResult, opts: &ExtractOptions) -> Result<ExtractReport> {
    paths::ensure_initialized(root)?;
    let serena = serena_status();
    if opts.require_serena && !serena.available {
        return Err(SddError::SerenaUnavailable(SERENA_INSTALL_HINT.to_string()));
    }
    if !serena.available {
        tracing::info!("Serena MCP not available; writing structural drafts only");
    }

    let wanted: BTreeSet<String> = opts.domains.iter().map(|d| sanitize_domain(d)).collect();
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let mut meta = ReverseMeta::load(root)?;
    let mut report = ExtractReport::default();

    for domain in &scan.domains {
        let id = sanitize_domain(&domain.name);
        if !wanted.is_empty() && !wanted.contains(&id) {
            continue;
        }
        if paths::validate_feature_name(&id).is_err() {
            tracing::warn!(domain = %domain.name, "skipping domain with unusable name");
            report.skipped.push(domain.name.clone());
            continue;
        }
        let path = paths::spec_file(root, &id);
        if path.exists() && !opts.force {
            report.skipped.push(id);
            continue;
        }
        crate::io::atomic_write(&path, draft_spec(domain, &id, &today).as_bytes())?;
        ReverseMeta::note(&mut meta.extracted, &id);
        report.created.push(id);
    }

    meta.save(root)?;
    tracing::info!(created = report.created.len(), skipped = report.skipped.len(), "extracted drafts");
    Ok(report)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftSummary {
    pub id: String,
    pub title: String,
    pub status: String,
    pub requirements: usize,
}

/// Specs still carrying the reverse-extracted marker.
pub fn review(root: &Path) -> Result<Vec<DraftSummary>> {
    paths::ensure_initialized(root)?;
    Ok(spec::load_all(root)?
        .into_iter()
        .filter(|s| s.frontmatter.extra_str("source") == Some(EXTRACTED_SOURCE))
        .map(|s| DraftSummary {
            status: s.status_str().to_string(),
            requirements: s.requirements.len(),
            id: s.id,
            title: s.title,
        })
        .collect())
}

/// Promote a draft to `review` and drop the extraction marker.
pub fn finalize(root: &Path, id: &str) -> Result<()> {
    let path = paths::spec_file(root, id);
    let content = crate::io::read_optional(&path)?
        .ok_or_else(|| SddError::FeatureNotFound(id.to_string()))?;
    let fm = frontmatter::parse(&content)?.unwrap_or_default();
    if fm.extra_str("source") != Some(EXTRACTED_SOURCE) {
        return Err(SddError::FeatureNotFound(format!(
            "{id} (not a reverse-extracted draft)"
        )));
    }
    let updated = frontmatter::set_field(&content, "status", "review");
    let updated = frontmatter::remove_field(&updated, "source");
    crate::io::atomic_write(&path, updated.as_bytes())?;

    let mut meta = ReverseMeta::load(root)?;
    ReverseMeta::note(&mut meta.finalized, id);
    meta.save(root)?;
    tracing::info!(id, "finalized extracted spec");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
