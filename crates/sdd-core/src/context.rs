use crate::error::{Result, SddError};
use crate::paths;
use crate::validate::id_matches;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The active working domain, persisted in `.sdd/context.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Context {
    pub fn load(root: &Path) -> Result<Self> {
        match crate::io::read_optional(&paths::context_path(root))? {
            Some(data) if !data.trim().is_empty() => Ok(serde_json::from_str(&data)?),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(&paths::context_path(root), data.as_bytes())
    }

    /// True when no domain is active or `id` lies inside it.
    pub fn includes(&self, id: &str) -> bool {
        self.active_domain
            .as_deref()
            .map(|d| id_matches(id, d))
            .unwrap_or(true)
    }
}

/// Make `domain` the active context. Unless `create` is set, the domain must
/// already exist as a spec directory.
pub fn set_domain(root: &Path, domain: &str, create: bool) -> Result<Context> {
    paths::ensure_initialized(root)?;
    let domain = domain.trim_matches('/');
    paths::validate_feature_name(domain)?;

    let dir = paths::spec_dir(root, domain);
    if !dir.is_dir() {
        if !create {
            return Err(SddError::FeatureNotFound(domain.to_string()));
        }
        crate::io::ensure_dir(&dir)?;
        tracing::info!(domain, "created domain directory");
    }

    let ctx = Context {
        active_domain: Some(domain.to_string()),
        updated_at: Some(Utc::now()),
    };
    ctx.save(root)?;
    Ok(ctx)
}

pub fn clear(root: &Path) -> Result<()> {
    paths::ensure_initialized(root)?;
    let ctx = Context {
        active_domain: None,
        updated_at: Some(Utc::now()),
    };
    ctx.save(root)
}
