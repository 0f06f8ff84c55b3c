use crate::context::Context;
use crate::error::{Result, SddError};
use crate::frontmatter;
use crate::paths;
use crate::spec::{self, Spec};
use crate::tasks::{self, TaskProgress};
use crate::templates;
use crate::types::SpecStatus;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Id generation
// ---------------------------------------------------------------------------

pub fn generate_feature_number(n: u32) -> String {
    format!("{n:03}")
}

pub fn generate_branch_name(n: u32, name: &str) -> String {
    format!("feature/{}-{name}", generate_feature_number(n))
}

pub fn generate_task_id(n: u32) -> String {
    format!("T{n:03}")
}

/// Next `CHG-NNN` after the highest id in `existing`. Entries may carry a
/// date prefix (`2026-01-05-CHG-003`); anything else is ignored.
pub fn generate_change_id(existing: &[String]) -> String {
    let max = existing
        .iter()
        .filter_map(|id| {
            let pos = id.rfind("CHG-")?;
            id[pos + 4..].parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0);
    format!("CHG-{:03}", max + 1)
}

// ---------------------------------------------------------------------------
// Counter
// ---------------------------------------------------------------------------

/// Sequential feature counter in `.sdd/counter.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub next: u32,
}

impl Default for Counter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl Counter {
    pub fn load(root: &Path) -> Result<Self> {
        match crate::io::read_optional(&paths::counter_path(root))? {
            Some(data) if !data.trim().is_empty() => Ok(serde_json::from_str(&data)?),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(&paths::counter_path(root), data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// FeaturePhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeaturePhase {
    Specified,
    Planned,
    Tasked,
    Implementing,
    Done,
}

impl FeaturePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            FeaturePhase::Specified => "specified",
            FeaturePhase::Planned => "planned",
            FeaturePhase::Tasked => "tasked",
            FeaturePhase::Implementing => "implementing",
            FeaturePhase::Done => "done",
        }
    }
}

impl std::fmt::Display for FeaturePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the workflow phase from the files present and task progress.
pub fn phase_of(root: &Path, spec: &Spec) -> Result<FeaturePhase> {
    if spec.status() == Some(SpecStatus::Implemented) {
        return Ok(FeaturePhase::Done);
    }
    if let Some(items) = tasks::load_tasks(root, &spec.id)? {
        let progress = TaskProgress::of(&items);
        return Ok(if progress.is_complete() {
            FeaturePhase::Done
        } else if progress.done > 0 || progress.in_progress > 0 {
            FeaturePhase::Implementing
        } else {
            FeaturePhase::Tasked
        });
    }
    if paths::plan_file(root, &spec.id).exists() {
        return Ok(FeaturePhase::Planned);
    }
    Ok(FeaturePhase::Specified)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub numbered: bool,
    pub with_plan: bool,
    pub with_tasks: bool,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedFeature {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub files: Vec<PathBuf>,
}

pub fn create_feature(root: &Path, name: &str, opts: &CreateOptions) -> Result<CreatedFeature> {
    paths::ensure_initialized(root)?;
    let name = name.trim_matches('/');
    paths::validate_feature_name(name)?;

    let base = name.rsplit('/').next().unwrap_or(name);
    let title = opts
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| title_from_name(base));

    let counter = if opts.numbered {
        Some(Counter::load(root)?)
    } else {
        None
    };
    let (id, number, branch) = if let Some(counter) = counter {
        let n = counter.next;
        let id = match name.rsplit_once('/') {
            Some((domain, leaf)) => format!("{domain}/{}-{leaf}", generate_feature_number(n)),
            None => format!("{}-{name}", generate_feature_number(n)),
        };
        (
            id,
            Some(generate_feature_number(n)),
            Some(generate_branch_name(n, base)),
        )
    } else {
        (name.to_string(), None, None)
    };

    if paths::spec_file(root, &id).exists() {
        return Err(SddError::FeatureExists(id));
    }
    if let Some(mut counter) = counter {
        counter.next += 1;
        counter.save(root)?;
    }

    let today = today();
    let content = templates::spec(&templates::SpecTemplate {
        title: &title,
        description: opts.description.as_deref(),
        created: &today,
        depends_on: &opts.depends_on,
        feature_number: number.as_deref(),
        req_prefix: &templates::requirement_prefix(&id),
    });
    let spec_path = paths::spec_file(root, &id);
    crate::io::atomic_write(&spec_path, content.as_bytes())?;
    let mut files = vec![spec_path];

    if opts.with_plan {
        files.push(create_plan(root, &id)?.path);
    }
    if opts.with_tasks {
        files.push(create_tasks(root, &id)?.path);
    }

    tracing::info!(id = %id, "created feature");
    Ok(CreatedFeature {
        id,
        title,
        number,
        branch,
        files,
    })
}

/// `001-user-auth` → `User Auth`.
pub fn title_from_name(name: &str) -> String {
    let trimmed = match name.split_once('-') {
        Some((prefix, rest)) if prefix.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => name,
    };
    trimmed
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaffolded {
    pub path: PathBuf,
    /// False when the file already existed and was left alone.
    pub created: bool,
}

pub fn create_plan(root: &Path, id: &str) -> Result<Scaffolded> {
    let spec = Spec::load(root, id)?;
    let path = paths::plan_file(root, id);
    let created = crate::io::write_if_missing(
        &path,
        templates::plan(id, &spec.title, &today()).as_bytes(),
    )?;
    Ok(Scaffolded { path, created })
}

/// Scaffold tasks.md with one task per requirement of the spec.
pub fn create_tasks(root: &Path, id: &str) -> Result<Scaffolded> {
    let spec = Spec::load(root, id)?;
    let path = paths::tasks_file(root, id);
    let created = crate::io::write_if_missing(
        &path,
        templates::tasks(id, &spec.title, &today(), &spec.requirements).as_bytes(),
    )?;
    Ok(Scaffolded { path, created })
}

// ---------------------------------------------------------------------------
// List / status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecSummary {
    pub id: String,
    pub title: String,
    pub status: String,
    pub requirements: usize,
    pub scenarios: usize,
    pub phase: FeaturePhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskProgress>,
}

pub fn summarize(root: &Path, spec: &Spec) -> Result<SpecSummary> {
    let progress = tasks::load_tasks(root, &spec.id)?.map(|items| TaskProgress::of(&items));
    Ok(SpecSummary {
        id: spec.id.clone(),
        title: spec.title.clone(),
        status: spec.status_str().to_string(),
        requirements: spec.requirements.len(),
        scenarios: spec.scenarios.len(),
        phase: phase_of(root, spec)?,
        depends_on: spec.depends_on().to_vec(),
        tasks: progress,
    })
}

/// All specs sorted by id, limited to the active context domain.
pub fn list_specs(root: &Path) -> Result<Vec<SpecSummary>> {
    paths::ensure_initialized(root)?;
    let ctx = Context::load(root)?;
    let mut out = Vec::new();
    for spec in spec::load_all(root)? {
        if ctx.includes(&spec.id) {
            out.push(summarize(root, &spec)?);
        }
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
}

/// Rewrite the `status` (and `updated`) frontmatter fields in place.
pub fn update_status(root: &Path, id: &str, status: SpecStatus) -> Result<()> {
    let path = paths::spec_file(root, id);
    let content = crate::io::read_optional(&path)?
        .ok_or_else(|| SddError::FeatureNotFound(id.to_string()))?;
    let updated = frontmatter::set_field(&content, "status", status.as_str());
    let updated = frontmatter::set_field(&updated, "updated", &today());
    crate::io::atomic_write(&path, updated.as_bytes())?;
    tracing::info!(id, status = %status, "spec status updated");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(paths::specs_dir(dir.path())).unwrap();
        dir
    }

    #[test]
    fn id_generators_are_pure() {
        assert_eq!(generate_feature_number(7), "007");
        assert_eq!(generate_branch_name(12, "user-auth"), "feature/012-user-auth");
        assert_eq!(generate_task_id(1), "T001");
        assert_eq!(generate_task_id(1), generate_task_id(1));
        assert_eq!(generate_change_id(&[]), "CHG-001");
        assert_eq!(
            generate_change_id(&[
                "CHG-002".to_string(),
                "2026-01-05-CHG-009".to_string(),
                "notes".to_string()
            ]),
            "CHG-010"
        );
    }

    #[test]
    fn numbered_features_advance_counter() {
        let dir = init();
        let opts = CreateOptions {
            numbered: true,
            ..Default::default()
        };
        assert_eq!(create_feature(dir.path(), "a", &opts).unwrap().id, "001-a");
        assert_eq!(create_feature(dir.path(), "b", &opts).unwrap().id, "002-b");
        assert_eq!(Counter::load(dir.path()).unwrap().next, 3);
    }

    #[test]
    fn failed_numbered_create_keeps_counter() {
        let dir = init();
        create_feature(dir.path(), "001-auth", &CreateOptions::default()).unwrap();
        let opts = CreateOptions {
            numbered: true,
            ..Default::default()
        };
        let err = create_feature(dir.path(), "auth", &opts).unwrap_err();
        assert_eq!(err.code(), "E003");
        assert_eq!(Counter::load(dir.path()).unwrap().next, 1);
        assert_eq!(create_feature(dir.path(), "billing", &opts).unwrap().id, "001-billing");
    }

    #[test]
    fn create_numbered_feature_with_plan_and_tasks() {
        let dir = init();
        let opts = CreateOptions {
            numbered: true,
            with_plan: true,
            with_tasks: true,
            ..Default::default()
        };
        let created = create_feature(dir.path(), "user-auth", &opts).unwrap();
        assert_eq!(created.id, "001-user-auth");
        assert_eq!(created.title, "User Auth");
        assert_eq!(created.branch.as_deref(), Some("feature/001-user-auth"));
        assert_eq!(created.files.len(), 3);

        let spec = Spec::load(dir.path(), "001-user-auth").unwrap();
        assert_eq!(spec.status(), Some(SpecStatus::Draft));
        assert_eq!(
            phase_of(dir.path(), &spec).unwrap(),
            FeaturePhase::Tasked
        );
    }

    #[test]
    fn create_refuses_existing_and_bad_names() {
        let dir = init();
        create_feature(dir.path(), "billing", &CreateOptions::default()).unwrap();
        let err = create_feature(dir.path(), "billing", &CreateOptions::default()).unwrap_err();
        assert_eq!(err.code(), "E003");
        let err = create_feature(dir.path(), "Bad Name", &CreateOptions::default()).unwrap_err();
        assert_eq!(err.code(), "E002");
    }

    #[test]
    fn create_requires_init() {
        let dir = TempDir::new().unwrap();
        let err = create_feature(dir.path(), "x", &CreateOptions::default()).unwrap_err();
        assert_eq!(err.code(), "E001");
    }

    #[test]
    fn list_honours_context() {
        let dir = init();
        create_feature(dir.path(), "auth/login", &CreateOptions::default()).unwrap();
        create_feature(dir.path(), "billing", &CreateOptions::default()).unwrap();
        assert_eq!(list_specs(dir.path()).unwrap().len(), 2);

        crate::context::set_domain(dir.path(), "auth", false).unwrap();
        let listed = list_specs(dir.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "auth/login");
        assert_eq!(listed[0].phase, FeaturePhase::Specified);
    }

    #[test]
    fn update_status_rewrites_frontmatter() {
        let dir = init();
        create_feature(dir.path(), "billing", &CreateOptions::default()).unwrap();
        update_status(dir.path(), "billing", SpecStatus::Approved).unwrap();
        let spec = Spec::load(dir.path(), "billing").unwrap();
        assert_eq!(spec.status(), Some(SpecStatus::Approved));
        assert!(spec.frontmatter.updated.is_some());
    }

    #[test]
    fn phase_progresses_with_tasks() {
        let dir = init();
        create_feature(
            dir.path(),
            "billing",
            &CreateOptions {
                with_tasks: true,
                ..Default::default()
            },
        )
        .unwrap();
        tasks::mark_task(dir.path(), "billing", "T001", tasks::TaskStatus::Done).unwrap();
        let spec = Spec::load(dir.path(), "billing").unwrap();
        assert_eq!(phase_of(dir.path(), &spec).unwrap(), FeaturePhase::Implementing);
        tasks::mark_task(dir.path(), "billing", "T002", tasks::TaskStatus::Done).unwrap();
        assert_eq!(phase_of(dir.path(), &spec).unwrap(), FeaturePhase::Done);
    }

    #[test]
    fn titles_from_names() {
        assert_eq!(title_from_name("001-user-auth"), "User Auth");
        assert_eq!(title_from_name("billing"), "Billing");
    }
}
