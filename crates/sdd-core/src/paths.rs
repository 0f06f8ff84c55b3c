use crate::error::{Result, SddError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SDD_DIR: &str = ".sdd";
pub const SPECS_DIR: &str = ".sdd/specs";
pub const CHANGES_DIR: &str = ".sdd/changes";
pub const ARCHIVE_DIR: &str = ".sdd/archive";
pub const TEMPLATES_DIR: &str = ".sdd/templates";
pub const EXPORTS_DIR: &str = ".sdd/exports";

pub const CONFIG_FILE: &str = ".sdd/config.yaml";
pub const CONSTITUTION_FILE: &str = ".sdd/constitution.md";
pub const CONSTITUTION_CHANGELOG: &str = ".sdd/constitution-changelog.md";
pub const COUNTER_FILE: &str = ".sdd/counter.json";
pub const CONTEXT_FILE: &str = ".sdd/context.json";
pub const REVERSE_META_FILE: &str = ".sdd/.reverse-meta.json";
pub const CACHE_FILE: &str = ".sdd/cache.json";

pub const SPEC_MD: &str = "spec.md";
pub const PLAN_MD: &str = "plan.md";
pub const TASKS_MD: &str = "tasks.md";
pub const PROPOSAL_MD: &str = "proposal.md";
pub const DELTA_MD: &str = "delta.md";

pub const AGENTS_MD: &str = "AGENTS.md";
pub const CLAUDE_COMMANDS_DIR: &str = ".claude/commands";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn sdd_dir(root: &Path) -> PathBuf {
    root.join(SDD_DIR)
}

pub fn specs_dir(root: &Path) -> PathBuf {
    root.join(SPECS_DIR)
}

pub fn spec_dir(root: &Path, id: &str) -> PathBuf {
    specs_dir(root).join(id)
}

pub fn spec_file(root: &Path, id: &str) -> PathBuf {
    spec_dir(root, id).join(SPEC_MD)
}

pub fn plan_file(root: &Path, id: &str) -> PathBuf {
    spec_dir(root, id).join(PLAN_MD)
}

pub fn tasks_file(root: &Path, id: &str) -> PathBuf {
    spec_dir(root, id).join(TASKS_MD)
}

pub fn changes_dir(root: &Path) -> PathBuf {
    root.join(CHANGES_DIR)
}

pub fn change_dir(root: &Path, id: &str) -> PathBuf {
    changes_dir(root).join(id)
}

pub fn archive_dir(root: &Path) -> PathBuf {
    root.join(ARCHIVE_DIR)
}

/// `.sdd/archive/<yyyy-mm>`
pub fn archive_month_dir(root: &Path, month: &str) -> PathBuf {
    archive_dir(root).join(month)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn constitution_path(root: &Path) -> PathBuf {
    root.join(CONSTITUTION_FILE)
}

pub fn constitution_changelog_path(root: &Path) -> PathBuf {
    root.join(CONSTITUTION_CHANGELOG)
}

pub fn counter_path(root: &Path) -> PathBuf {
    root.join(COUNTER_FILE)
}

pub fn context_path(root: &Path) -> PathBuf {
    root.join(CONTEXT_FILE)
}

pub fn reverse_meta_path(root: &Path) -> PathBuf {
    root.join(REVERSE_META_FILE)
}

pub fn cache_path(root: &Path) -> PathBuf {
    root.join(CACHE_FILE)
}

pub fn agents_md_path(root: &Path) -> PathBuf {
    root.join(AGENTS_MD)
}

pub fn claude_commands_dir(root: &Path) -> PathBuf {
    root.join(CLAUDE_COMMANDS_DIR)
}

/// Fail with `NotInitialized` unless `.sdd/` exists under `root`.
pub fn ensure_initialized(root: &Path) -> Result<()> {
    if sdd_dir(root).is_dir() {
        Ok(())
    } else {
        Err(SddError::NotInitialized)
    }
}

/// Spec id for a spec file: its directory relative to `.sdd/specs`, with
/// `/` separators (`auth/login/spec.md` → `auth/login`).
pub fn spec_id_for(root: &Path, spec_path: &Path) -> Option<String> {
    let rel = spec_path.strip_prefix(specs_dir(root)).ok()?;
    let parent = rel.parent()?;
    let id = parent
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Path relative to `root`, rendered with `/` separators.
pub fn display_rel(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Validate a feature name or a `/`-separated domain path of names.
pub fn validate_feature_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(SddError::InvalidName(name.to_string()));
    }
    for segment in name.split('/') {
        if !name_re().is_match(segment) || segment.contains("--") {
            return Err(SddError::InvalidName(name.to_string()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["auth-login", "a", "001-user-auth", "billing/invoices"] {
            validate_feature_name(name).unwrap_or_else(|_| panic!("expected valid: {name}"));
        }
    }

    #[test]
    fn invalid_names() {
        for name in ["", "-dash", "dash-", "has spaces", "UPPER", "a_b", "a//b", "a--b"] {
            assert!(validate_feature_name(name).is_err(), "expected invalid: {name}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            spec_file(root, "auth"),
            PathBuf::from("/tmp/proj/.sdd/specs/auth/spec.md")
        );
        assert_eq!(
            archive_month_dir(root, "2026-03"),
            PathBuf::from("/tmp/proj/.sdd/archive/2026-03")
        );
    }

    #[test]
    fn spec_id_from_nested_path() {
        let root = Path::new("/tmp/proj");
        let path = root.join(".sdd/specs/billing/invoices/spec.md");
        assert_eq!(spec_id_for(root, &path).as_deref(), Some("billing/invoices"));
        assert_eq!(spec_id_for(root, &root.join(".sdd/specs/spec.md")), None);
    }
}
