//! Delta documents: requirement edits carried by a change proposal.
//!
//! ```text
//! ## ADDED Requirements
//! ### REQ-010: Export
//! The system SHALL export invoices.
//!
//! ## MODIFIED Requirements
//! ### REQ-002: Login
//! The system MUST lock accounts after 5 failures.
//!
//! ## REMOVED Requirements
//! ### REQ-004: Legacy
//! ```

use crate::error::{Result, SddError};
use crate::frontmatter::{self, Frontmatter};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Added,
    Modified,
    Removed,
}

impl DeltaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeltaKind::Added => "ADDED",
            DeltaKind::Modified => "MODIFIED",
            DeltaKind::Removed => "REMOVED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl DeltaItem {
    /// The requirement block as it is written into a spec.
    pub fn to_block(&self, depth: usize) -> String {
        let hashes = "#".repeat(depth.clamp(2, 4));
        let mut out = if self.title.is_empty() {
            format!("{hashes} {}\n", self.id)
        } else {
            format!("{hashes} {}: {}\n", self.id, self.title)
        };
        if !self.body.is_empty() {
            out.push_str(&self.body);
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub frontmatter: Frontmatter,
    #[serde(default)]
    pub title: String,
    pub added: Vec<DeltaItem>,
    pub modified: Vec<DeltaItem>,
    pub removed: Vec<DeltaItem>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = (DeltaKind, &DeltaItem)> {
        self.added
            .iter()
            .map(|i| (DeltaKind::Added, i))
            .chain(self.modified.iter().map(|i| (DeltaKind::Modified, i)))
            .chain(self.removed.iter().map(|i| (DeltaKind::Removed, i)))
    }

    /// Target spec named in the delta frontmatter (`spec: <id>`).
    pub fn target_spec(&self) -> Option<&str> {
        self.frontmatter.extra_str("spec")
    }
}

struct Patterns {
    section: Regex,
    item: Regex,
    removed_line: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        section: Regex::new(r"(?i)^##\s+(added|modified|removed)(?:\s+requirements?)?\s*:?\s*$")
            .unwrap(),
        item: Regex::new(r"^#{3,4}\s+(REQ-[A-Za-z0-9]+(?:-[A-Za-z0-9]+)*)\s*[:.\-]?\s*(.*)$")
            .unwrap(),
        removed_line: Regex::new(r"^[-*+]\s+(REQ-[A-Za-z0-9]+(?:-[A-Za-z0-9]+)*)\b").unwrap(),
    })
}

/// Parse a delta document. A delta without any item is `E302`.
pub fn parse_delta(content: &str) -> Result<Delta> {
    let fm = frontmatter::parse(content)?.unwrap_or_default();
    let body = frontmatter::split(content).body;
    let p = patterns();

    let mut delta = Delta {
        frontmatter: fm,
        ..Default::default()
    };
    let mut section: Option<DeltaKind> = None;
    let mut current: Option<(DeltaKind, DeltaItem)> = None;
    let mut in_fence = false;

    fn flush(delta: &mut Delta, current: &mut Option<(DeltaKind, DeltaItem)>) {
        if let Some((kind, mut item)) = current.take() {
            item.body = item.body.trim().to_string();
            match kind {
                DeltaKind::Added => delta.added.push(item),
                DeltaKind::Modified => delta.modified.push(item),
                DeltaKind::Removed => delta.removed.push(item),
            }
        }
    }

    for raw in body.lines() {
        let line = raw.trim_end();
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some(title) = line.strip_prefix("# ") {
                if delta.title.is_empty() {
                    delta.title = title.trim().to_string();
                }
                continue;
            }
            if let Some(c) = p.section.captures(line) {
                flush(&mut delta, &mut current);
                section = Some(match c[1].to_ascii_lowercase().as_str() {
                    "added" => DeltaKind::Added,
                    "modified" => DeltaKind::Modified,
                    _ => DeltaKind::Removed,
                });
                continue;
            }
            if line.starts_with("## ") {
                flush(&mut delta, &mut current);
                section = None;
                continue;
            }
            if let (Some(kind), Some(c)) = (section, p.item.captures(line)) {
                flush(&mut delta, &mut current);
                current = Some((
                    kind,
                    DeltaItem {
                        id: c[1].to_string(),
                        title: c[2].trim().to_string(),
                        body: String::new(),
                    },
                ));
                continue;
            }
            if section == Some(DeltaKind::Removed) && current.is_none() {
                if let Some(c) = p.removed_line.captures(line.trim_start()) {
                    delta.removed.push(DeltaItem {
                        id: c[1].to_string(),
                        title: String::new(),
                        body: String::new(),
                    });
                    continue;
                }
            }
        }
        if let Some((_, item)) = current.as_mut() {
            item.body.push_str(raw);
            item.body.push('\n');
        }
    }
    flush(&mut delta, &mut current);

    if delta.is_empty() {
        return Err(SddError::InvalidDelta(
            "no requirements under ADDED, MODIFIED or REMOVED".to_string(),
        ));
    }
    Ok(delta)
}

// ---------------------------------------------------------------------------
// Applying to a spec document
// ---------------------------------------------------------------------------

/// Requirement block located in a spec document, as a line range.
#[derive(Debug, Clone, Copy)]
struct BlockSpan {
    start: usize,
    end: usize,
    depth: usize,
}

static HEADING_RE: OnceLock<Regex> = OnceLock::new();

fn heading_re() -> &'static Regex {
    HEADING_RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.*)$").unwrap())
}

fn find_block(lines: &[&str], id: &str) -> Option<BlockSpan> {
    let mut in_fence = false;
    let mut found: Option<(usize, usize)> = None;
    for (i, line) in lines.iter().enumerate() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let Some(c) = heading_re().captures(line.trim_end()) else {
            continue;
        };
        if let Some((start, depth)) = found {
            return Some(BlockSpan { start, end: i, depth });
        }
        let text = c[2].trim();
        if let Some(c2) = patterns().item.captures(&format!("### {text}")) {
            if &c2[1] == id {
                found = Some((i, c[1].len()));
            }
        }
    }
    found.map(|(start, depth)| BlockSpan {
        start,
        end: lines.len(),
        depth,
    })
}

/// Apply the given items to a spec document. MODIFIED and REMOVED ids must
/// exist in the document and ADDED ids must not.
pub fn apply_to_spec(
    content: &str,
    added: &[&DeltaItem],
    modified: &[&DeltaItem],
    removed: &[&DeltaItem],
) -> Result<String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    for item in modified {
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let span = find_block(&refs, &item.id)
            .ok_or_else(|| SddError::InvalidDelta(format!("MODIFIED {} not found", item.id)))?;
        let mut replacement: Vec<String> =
            item.to_block(span.depth).lines().map(str::to_string).collect();
        replacement.push(String::new());
        lines.splice(span.start..span.end, replacement);
    }

    for item in removed {
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let span = find_block(&refs, &item.id)
            .ok_or_else(|| SddError::InvalidDelta(format!("REMOVED {} not found", item.id)))?;
        lines.drain(span.start..span.end);
    }

    if !added.is_empty() {
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        for item in added {
            if find_block(&refs, &item.id).is_some() {
                return Err(SddError::InvalidDelta(format!(
                    "ADDED {} already exists",
                    item.id
                )));
            }
        }
        let insert_at = requirements_section_end(&refs);
        let mut block: Vec<String> = Vec::new();
        for item in added {
            block.push(String::new());
            block.extend(item.to_block(3).lines().map(str::to_string));
        }
        match insert_at {
            Some(at) => {
                lines.splice(at..at, block);
            }
            None => {
                if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                    lines.push(String::new());
                }
                lines.push("## Requirements".to_string());
                lines.push(String::new());
                lines.extend(block);
            }
        }
    }

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

/// Line index just past the `## Requirements` section, before trailing blank
/// lines.
fn requirements_section_end(lines: &[&str]) -> Option<usize> {
    let start = lines.iter().position(|l| {
        l.trim_end()
            .strip_prefix("## ")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("requirements"))
    })?;
    let mut end = lines[start + 1..]
        .iter()
        .position(|l| l.starts_with("## ") || l.starts_with("# "))
        .map(|p| start + 1 + p)
        .unwrap_or(lines.len());
    while end > start + 1 && lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    Some(end)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
