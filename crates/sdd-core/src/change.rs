use crate::delta::{self, Delta, DeltaItem, DeltaKind};
use crate::error::{Result, SddError};
use crate::feature::generate_change_id;
use crate::frontmatter;
use crate::paths;
use crate::spec::Spec;
use crate::templates;
use crate::types::ChangeStatus;
use crate::validate::ValidationIssue;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// ChangeProposal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
struct ProposalMeta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, deserialize_with = "frontmatter::scalar_string")]
    created: Option<String>,
    #[serde(default, deserialize_with = "frontmatter::one_or_many")]
    affected_specs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeProposal {
    pub id: String,
    pub title: String,
    pub status: ChangeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub affected_specs: Vec<String>,
    pub dir: PathBuf,
}

impl ChangeProposal {
    pub fn proposal_path(&self) -> PathBuf {
        self.dir.join(paths::PROPOSAL_MD)
    }

    pub fn delta_path(&self) -> PathBuf {
        self.dir.join(paths::DELTA_MD)
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.dir.join(paths::TASKS_MD)
    }

    pub fn delta(&self) -> Result<Delta> {
        let content = crate::io::read_optional(&self.delta_path())?
            .ok_or_else(|| SddError::InvalidDelta(format!("{} has no delta.md", self.id)))?;
        delta::parse_delta(&content)
    }

    /// Read `proposal.md` in `dir`; `fallback_id` is used when the
    /// frontmatter carries no id.
    fn read(dir: &Path, fallback_id: &str) -> Result<Self> {
        let path = dir.join(paths::PROPOSAL_MD);
        let content = crate::io::read_optional(&path)?
            .ok_or_else(|| SddError::ChangeNotFound(fallback_id.to_string()))?;
        let meta: ProposalMeta = match frontmatter::split(&content).yaml {
            Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml)
                .map_err(|e| SddError::InvalidFrontmatter(e.to_string()))?,
            _ => ProposalMeta::default(),
        };
        let status = match meta.status.as_deref() {
            Some(s) => ChangeStatus::from_str(s)?,
            None => ChangeStatus::Draft,
        };
        let title = meta.title.filter(|t| !t.is_empty()).unwrap_or_else(|| {
            content
                .lines()
                .find_map(|l| l.strip_prefix("# "))
                .unwrap_or(fallback_id)
                .trim()
                .to_string()
        });
        Ok(Self {
            id: meta.id.unwrap_or_else(|| fallback_id.to_string()),
            title,
            status,
            created: meta.created,
            affected_specs: meta.affected_specs,
            dir: dir.to_path_buf(),
        })
    }
}

// ---------------------------------------------------------------------------
// Create / load / list
// ---------------------------------------------------------------------------

/// Ids of active and archived changes (archived ones keep their date prefix).
fn existing_ids(root: &Path) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let changes = paths::changes_dir(root);
    if changes.is_dir() {
        for entry in std::fs::read_dir(&changes)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    for archived in list_archived(root)? {
        ids.push(archived.id);
    }
    Ok(ids)
}

pub fn create_change(root: &Path, title: &str, affected_specs: &[String]) -> Result<ChangeProposal> {
    paths::ensure_initialized(root)?;
    let title = title.trim();
    if title.is_empty() {
        return Err(SddError::InvalidName(title.to_string()));
    }
    let id = generate_change_id(&existing_ids(root)?);
    let dir = paths::change_dir(root, &id);
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();

    crate::io::ensure_dir(&dir)?;
    crate::io::atomic_write(
        &dir.join(paths::PROPOSAL_MD),
        templates::proposal(&id, title, affected_specs, &today).as_bytes(),
    )?;
    crate::io::atomic_write(
        &dir.join(paths::DELTA_MD),
        templates::delta(&id, title).as_bytes(),
    )?;
    crate::io::atomic_write(
        &dir.join(paths::TASKS_MD),
        templates::change_tasks(&id, title).as_bytes(),
    )?;
    tracing::info!(id = %id, "created change proposal");
    load_change(root, &id)
}

pub fn load_change(root: &Path, id: &str) -> Result<ChangeProposal> {
    let dir = paths::change_dir(root, id);
    if !dir.is_dir() {
        return Err(SddError::ChangeNotFound(id.to_string()));
    }
    ChangeProposal::read(&dir, id)
}

/// Active (not archived) changes sorted by id.
pub fn list_changes(root: &Path) -> Result<Vec<ChangeProposal>> {
    paths::ensure_initialized(root)?;
    let dir = paths::changes_dir(root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match ChangeProposal::read(&entry.path(), &name) {
            Ok(c) => out.push(c),
            Err(e) => tracing::warn!(change = %name, "skipping change: {e}"),
        }
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedChange {
    /// Directory name, `<yyyy-mm-dd>-<id>`.
    pub id: String,
    pub month: String,
    pub change: ChangeProposal,
}

pub fn list_archived(root: &Path) -> Result<Vec<ArchivedChange>> {
    let archive = paths::archive_dir(root);
    if !archive.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for month in std::fs::read_dir(&archive)? {
        let month = month?;
        if !month.file_type()?.is_dir() {
            continue;
        }
        let month_name = month.file_name().to_string_lossy().into_owned();
        for entry in std::fs::read_dir(month.path())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let fallback = name.get(11..).unwrap_or(&name).to_string();
            match ChangeProposal::read(&entry.path(), &fallback) {
                Ok(change) => out.push(ArchivedChange {
                    id: name,
                    month: month_name.clone(),
                    change,
                }),
                Err(e) => tracing::warn!(archived = %name, "skipping archived change: {e}"),
            }
        }
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Rewrite `status:` in proposal.md. Applied, archived and rejected changes
/// are final.
pub fn set_change_status(root: &Path, id: &str, status: ChangeStatus) -> Result<ChangeProposal> {
    let change = load_change(root, id)?;
    if matches!(
        change.status,
        ChangeStatus::Applied | ChangeStatus::Archived | ChangeStatus::Rejected
    ) && status != ChangeStatus::Archived
    {
        return Err(SddError::InvalidChangeState {
            id: id.to_string(),
            status: change.status.to_string(),
            reason: format!("cannot move to {status}"),
        });
    }
    write_status(&change.proposal_path(), status)?;
    tracing::info!(id, status = %status, "change status updated");
    load_change(root, id)
}

fn write_status(proposal: &Path, status: ChangeStatus) -> Result<()> {
    let content = std::fs::read_to_string(proposal)?;
    let updated = frontmatter::set_field(&content, "status", status.as_str());
    crate::io::atomic_write(proposal, updated.as_bytes())
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeValidation {
    pub id: String,
    pub issues: Vec<ValidationIssue>,
}

impl ChangeValidation {
    pub fn is_valid(&self) -> bool {
        self.issues
            .iter()
            .all(|i| i.severity == crate::validate::IssueSeverity::Warning)
    }
}

pub fn validate_change(root: &Path, id: &str) -> Result<ChangeValidation> {
    let change = load_change(root, id)?;
    let mut issues = Vec::new();

    let delta = match change.delta() {
        Ok(d) => Some(d),
        Err(e) => {
            issues.push(ValidationIssue::error(&e, None));
            None
        }
    };

    let mut specs: BTreeMap<String, Spec> = BTreeMap::new();
    for spec_id in &change.affected_specs {
        match Spec::load(root, spec_id) {
            Ok(s) => {
                specs.insert(spec_id.clone(), s);
            }
            Err(e) => issues.push(ValidationIssue::error(&e, None)),
        }
    }
    if change.affected_specs.is_empty() {
        issues.push(ValidationIssue::warning(
            "W301",
            "proposal lists no affected_specs",
            None,
        ));
    }

    if let Some(delta) = &delta {
        if !change.affected_specs.is_empty() {
            if let Err(e) = plan_targets(&change, delta, &specs) {
                issues.push(ValidationIssue::error(&e, None));
            }
        }
    }

    Ok(ChangeValidation {
        id: change.id,
        issues,
    })
}

type Targets<'a> = BTreeMap<String, [Vec<&'a DeltaItem>; 3]>;

/// Assign each delta item to the spec it edits.
///
/// MODIFIED / REMOVED items go to the affected spec defining the id. ADDED
/// items go to the delta's `spec:` target, or the first affected spec.
fn plan_targets<'a>(
    change: &ChangeProposal,
    delta: &'a Delta,
    specs: &BTreeMap<String, Spec>,
) -> Result<Targets<'a>> {
    let mut targets: Targets<'a> = BTreeMap::new();
    let default_target = delta
        .target_spec()
        .map(str::to_string)
        .or_else(|| change.affected_specs.first().cloned());

    for (kind, item) in delta.items() {
        let spec_id = match kind {
            DeltaKind::Added => {
                let target = default_target.clone().ok_or_else(|| {
                    SddError::InvalidDelta(format!("no target spec for ADDED {}", item.id))
                })?;
                if let Some(spec) = specs.get(&target) {
                    if spec.requirement(&item.id).is_some() {
                        return Err(SddError::InvalidDelta(format!(
                            "ADDED {} already exists in {target}",
                            item.id
                        )));
                    }
                }
                target
            }
            DeltaKind::Modified | DeltaKind::Removed => specs
                .iter()
                .find(|(_, s)| s.requirement(&item.id).is_some_and(|r| r.explicit))
                .map(|(id, _)| id.clone())
                .ok_or_else(|| {
                    SddError::InvalidDelta(format!(
                        "{} {} not found in affected specs",
                        kind.as_str(),
                        item.id
                    ))
                })?,
        };
        let slot = match kind {
            DeltaKind::Added => 0,
            DeltaKind::Modified => 1,
            DeltaKind::Removed => 2,
        };
        targets.entry(spec_id).or_default()[slot].push(item);
    }
    Ok(targets)
}

// ---------------------------------------------------------------------------
// Apply / archive
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedSpec {
    pub spec: String,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub id: String,
    pub specs: Vec<AppliedSpec>,
}

/// Apply the delta to every target spec, then mark the change applied.
/// Nothing is written unless every spec accepts its edits.
pub fn apply_change(root: &Path, id: &str, force: bool) -> Result<ApplyReport> {
    let change = load_change(root, id)?;
    let allowed = change.status == ChangeStatus::Approved
        || (force && !matches!(change.status, ChangeStatus::Applied | ChangeStatus::Archived));
    if !allowed {
        return Err(SddError::InvalidChangeState {
            id: id.to_string(),
            status: change.status.to_string(),
            reason: "only approved changes can be applied".to_string(),
        });
    }

    let delta = change.delta()?;
    let mut specs: BTreeMap<String, Spec> = BTreeMap::new();
    let mut spec_ids = change.affected_specs.clone();
    if let Some(target) = delta.target_spec() {
        if !spec_ids.iter().any(|s| s == target) {
            spec_ids.push(target.to_string());
        }
    }
    for spec_id in &spec_ids {
        specs.insert(spec_id.clone(), Spec::load(root, spec_id)?);
    }
    let targets = plan_targets(&change, &delta, &specs)?;

    let mut writes = Vec::new();
    let mut report = ApplyReport {
        id: change.id.clone(),
        specs: Vec::new(),
    };
    for (spec_id, [added, modified, removed]) in &targets {
        let path = paths::spec_file(root, spec_id);
        let content = std::fs::read_to_string(&path)?;
        let updated = delta::apply_to_spec(&content, added, modified, removed)?;
        writes.push((path, updated));
        let ids = |items: &[&DeltaItem]| -> Vec<String> { items.iter().map(|i| i.id.clone()).collect() };
        report.specs.push(AppliedSpec {
            spec: spec_id.clone(),
            added: ids(added),
            modified: ids(modified),
            removed: ids(removed),
        });
    }

    for (path, content) in writes {
        crate::io::atomic_write(&path, content.as_bytes())?;
    }
    write_status(&change.proposal_path(), ChangeStatus::Applied)?;
    tracing::info!(id, specs = report.specs.len(), "change applied");
    Ok(report)
}

/// Move the change to `.sdd/archive/<yyyy-mm>/<yyyy-mm-dd>-<id>/` and mark
/// it archived.
pub fn archive_change(root: &Path, id: &str, today: NaiveDate) -> Result<PathBuf> {
    let change = load_change(root, id)?;
    if change.status != ChangeStatus::Applied {
        tracing::warn!(id, status = %change.status, "archiving a change that was not applied");
    }
    let month = today.format("%Y-%m").to_string();
    let target = paths::archive_month_dir(root, &month)
        .join(format!("{}-{}", today.format("%Y-%m-%d"), change.id));
    if target.exists() {
        return Err(SddError::InvalidChangeState {
            id: id.to_string(),
            status: change.status.to_string(),
            reason: format!("{} already exists", paths::display_rel(root, &target)),
        });
    }

    crate::io::move_dir(&change.dir, &target)?;
    write_status(&target.join(paths::PROPOSAL_MD), ChangeStatus::Archived)?;
    tracing::info!(id, to = %target.display(), "change archived");
    Ok(target)
}

/// Spec ids referenced by active changes, used to warn before editing a
/// spec that has pending proposals.
pub fn pending_changes_for(root: &Path, spec_id: &str) -> Result<Vec<String>> {
    Ok(list_changes(root)?
        .into_iter()
        .filter(|c| {
            !matches!(c.status, ChangeStatus::Applied | ChangeStatus::Rejected)
                && c.affected_specs.iter().any(|s| s == spec_id)
        })
        .map(|c| c.id)
        .collect())
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
        std::fs::create_dir_all(paths::specs_dir(dir.path())).unwrap();
        create_feature(dir.path(), "auth", &CreateOptions::default()).unwrap();
        dir
    }

    const DELTA: &str = "---\nchange: CHG-001\n---\n# Delta\n\n## ADDED Requirements\n\n### REQ-002: Lockout\nThe system SHALL lock accounts.\n\n## MODIFIED Requirements\n\n### REQ-AUTH-001: Primary behaviour\nThe system MUST support SSO.\n";

    #[test]
    fn create_allocates_sequential_ids() {
        let dir = project();
        let a = create_change(dir.path(), "First", &["auth".to_string()]).unwrap();
        let b = create_change(dir.path(), "Second \"quoted\"", &[]).unwrap();
        assert_eq!(a.id, "CHG-001");
        assert_eq!(b.id, "CHG-002");
        assert_eq!(b.title, "Second \"quoted\"");
        assert_eq!(a.status, ChangeStatus::Draft);
        assert_eq!(a.affected_specs, vec!["auth"]);
        assert!(a.delta_path().exists());
        assert_eq!(list_changes(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn missing_change_is_e301() {
        let dir = project();
        assert_eq!(load_change(dir.path(), "CHG-404").unwrap_err().code(), "E301");
    }

    #[test]
    fn validate_checks_targets() {
        let dir = project();
        let c = create_change(dir.path(), "Lockout", &["auth".to_string()]).unwrap();
        std::fs::write(c.delta_path(), DELTA).unwrap();
        assert!(validate_change(dir.path(), &c.id).unwrap().is_valid());

        std::fs::write(c.delta_path(), DELTA.replace("REQ-AUTH-001", "REQ-404")).unwrap();
        let v = validate_change(dir.path(), &c.id).unwrap();
        assert!(!v.is_valid());
        assert_eq!(v.issues[0].code, "E302");
    }

    #[test]
    fn apply_requires_approval_then_edits_spec() {
        let dir = project();
        let c = create_change(dir.path(), "Lockout", &["auth".to_string()]).unwrap();
        std::fs::write(c.delta_path(), DELTA).unwrap();

        let err = apply_change(dir.path(), &c.id, false).unwrap_err();
        assert_eq!(err.code(), "E303");

        set_change_status(dir.path(), &c.id, ChangeStatus::Approved).unwrap();
        let report = apply_change(dir.path(), &c.id, false).unwrap();
        assert_eq!(report.specs[0].added, vec!["REQ-002"]);
        assert_eq!(report.specs[0].modified, vec!["REQ-AUTH-001"]);

        let spec = Spec::load(dir.path(), "auth").unwrap();
        assert!(spec.requirement("REQ-002").is_some());
        assert!(spec.requirement("REQ-AUTH-001").unwrap().description.contains("SSO"));
        assert_eq!(load_change(dir.path(), &c.id).unwrap().status, ChangeStatus::Applied);
        assert!(apply_change(dir.path(), &c.id, true).is_err());
    }

    #[test]
    fn archive_moves_and_rewrites_status() {
        let dir = project();
        let c = create_change(dir.path(), "Lockout", &["auth".to_string()]).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let target = archive_change(dir.path(), &c.id, today).unwrap();

        assert_eq!(
            target,
            dir.path().join(".sdd/archive/2026-03/2026-03-09-CHG-001")
        );
        assert!(!c.dir.exists());
        let proposal = std::fs::read_to_string(target.join("proposal.md")).unwrap();
        assert!(proposal.contains("status: archived"));
        assert!(proposal.contains("# Lockout"));

        let archived = list_archived(dir.path()).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].change.status, ChangeStatus::Archived);

        let next = create_change(dir.path(), "Next", &[]).unwrap();
        assert_eq!(next.id, "CHG-002");
    }

    #[test]
    fn final_states_are_sticky() {
        let dir = project();
        let c = create_change(dir.path(), "X", &[]).unwrap();
        set_change_status(dir.path(), &c.id, ChangeStatus::Rejected).unwrap();
        let err = set_change_status(dir.path(), &c.id, ChangeStatus::Approved).unwrap_err();
        assert_eq!(err.code(), "E303");
    }
}
