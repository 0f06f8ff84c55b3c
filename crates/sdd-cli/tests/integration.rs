#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn sdd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sdd").unwrap();
    cmd.current_dir(dir.path())
        .env("SDD_ROOT", dir.path())
        .env_remove("SERENA_MCP_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    sdd(dir).arg("init").assert().success();
}

fn new_spec(dir: &TempDir, name: &str) {
    sdd(dir).args(["new", name]).assert().success();
}

fn read(dir: &TempDir, rel: &str) -> String {
    std::fs::read_to_string(dir.path().join(rel)).unwrap()
}

fn write(dir: &TempDir, rel: &str, content: &str) {
    let path = dir.path().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

// ---------------------------------------------------------------------------
// sdd init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_directory_tree() {
    let dir = TempDir::new().unwrap();
    sdd(&dir).arg("init").assert().success();

    for d in [".sdd", ".sdd/specs", ".sdd/changes", ".sdd/archive", ".sdd/templates"] {
        assert!(dir.path().join(d).is_dir(), "{d} missing");
    }
    for f in [
        ".sdd/config.yaml",
        ".sdd/counter.json",
        ".sdd/constitution.md",
        ".sdd/constitution-changelog.md",
        ".sdd/templates/spec.md",
        ".sdd/templates/delta.md",
        "AGENTS.md",
        ".claude/commands/sdd-new.md",
    ] {
        assert!(dir.path().join(f).exists(), "{f} missing");
    }
    assert!(read(&dir, ".gitignore").contains(".sdd/cache.json"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    sdd(&dir).arg("init").assert().success();
    std::fs::write(dir.path().join(".sdd/constitution.md"), "---\nversion: 2.0.0\n---\n# Mine\n")
        .unwrap();

    sdd(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .sdd/constitution.md"));
    assert!(read(&dir, ".sdd/constitution.md").contains("# Mine"));
}

#[test]
fn init_refreshes_agents_section_without_duplicating() {
    let dir = TempDir::new().unwrap();
    write(&dir, "AGENTS.md", "# Existing content\n");
    sdd(&dir).arg("init").assert().success();
    sdd(&dir).arg("init").assert().success();

    let content = read(&dir, "AGENTS.md");
    assert!(content.contains("# Existing content"));
    assert_eq!(content.matches("<!-- sdd:start -->").count(), 1);
    assert!(content.contains("## SDD"));
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    sdd(&dir)
        .args(["new", "auth"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E001"));
}

// ---------------------------------------------------------------------------
// sdd new / validate / list / status
// ---------------------------------------------------------------------------

#[test]
fn new_spec_validates_and_lists() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sdd(&dir)
        .args(["new", "user-auth", "--title", "User Authentication"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".sdd/specs/user-auth/spec.md"));

    sdd(&dir).args(["validate", "user-auth"]).assert().success();
    sdd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("User Authentication"));
}

#[test]
fn new_numbered_uses_counter() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sdd(&dir).args(["new", "auth", "--numbered"]).assert().success();
    sdd(&dir).args(["new", "billing", "--numbered"]).assert().success();

    assert!(dir.path().join(".sdd/specs/001-auth/spec.md").exists());
    assert!(dir.path().join(".sdd/specs/002-billing/spec.md").exists());
}

#[test]
fn new_rejects_existing_feature() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    sdd(&dir)
        .args(["new", "auth"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E003"));
}

#[test]
fn validate_failure_exits_with_validation_code() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(
        &dir,
        ".sdd/specs/broken/spec.md",
        "---\nstatus: draft\n---\n# Broken\n\nNo requirements here.\n",
    );

    sdd(&dir)
        .args(["validate", "broken"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("E204"));
}

#[test]
fn validate_single_file_path() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    sdd(&dir)
        .args(["validate", ".sdd/specs/auth/spec.md"])
        .assert()
        .success();
}

#[test]
fn validate_unknown_target_is_not_found() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sdd(&dir)
        .args(["validate", "nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E004"));
}

#[test]
fn validate_json_reports_counts() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");

    let out = sdd(&dir).args(["--json", "validate"]).assert().success();
    let v: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(v["valid"], true);
    assert_eq!(v["errors"], 0);
    assert_eq!(v["reports"].as_array().unwrap().len(), 1);
}

#[test]
fn status_set_updates_frontmatter() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");

    sdd(&dir)
        .args(["status", "auth", "--set", "approved"])
        .assert()
        .success();
    assert!(read(&dir, ".sdd/specs/auth/spec.md").contains("status: approved"));

    sdd(&dir)
        .args(["list", "--status", "approved"])
        .assert()
        .success()
        .stdout(predicate::str::contains("auth"));
}

#[test]
fn status_rejects_unknown_value() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    sdd(&dir)
        .args(["status", "auth", "--set", "shipped"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("E206"));
}

// ---------------------------------------------------------------------------
// sdd plan / tasks / prepare
// ---------------------------------------------------------------------------

#[test]
fn tasks_scaffold_and_mark_done() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");

    sdd(&dir)
        .args(["tasks", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("T001"));
    sdd(&dir)
        .args(["tasks", "auth", "--done", "T001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[x] T001"));
    assert!(read(&dir, ".sdd/specs/auth/tasks.md").contains("- [x] T001"));
}

#[test]
fn tasks_unknown_id_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sdd(&dir).args(["new", "auth", "--tasks"]).assert().success();
    sdd(&dir)
        .args(["tasks", "auth", "--done", "T999"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E005"));
}

#[test]
fn prepare_points_at_missing_plan() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");

    sdd(&dir)
        .args(["prepare", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sdd plan auth"));

    sdd(&dir).args(["plan", "auth"]).assert().success();
    sdd(&dir)
        .args(["prepare", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sdd tasks auth"));
}

// ---------------------------------------------------------------------------
// sdd graph / impact
// ---------------------------------------------------------------------------

#[test]
fn graph_mermaid_shows_dependency_edge() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    sdd(&dir)
        .args(["new", "billing", "--depends-on", "auth"])
        .assert()
        .success();

    sdd(&dir)
        .args(["graph", "--mermaid"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("graph TD"))
        .stdout(predicate::str::contains("auth"));

    sdd(&dir)
        .args(["impact", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("billing"));
}

#[test]
fn unknown_dependency_fails_validation() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sdd(&dir)
        .args(["new", "billing", "--depends-on", "ghost"])
        .assert()
        .success();
    sdd(&dir)
        .arg("validate")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("E208"));
}

// ---------------------------------------------------------------------------
// sdd change
// ---------------------------------------------------------------------------

#[test]
fn change_lifecycle_applies_and_archives() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");

    sdd(&dir)
        .args(["change", "create", "Add", "lockout", "--spec", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CHG-001"));
    sdd(&dir).args(["change", "validate", "CHG-001"]).assert().success();

    sdd(&dir)
        .args(["change", "apply", "CHG-001"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E303"));

    sdd(&dir).args(["change", "approve", "CHG-001"]).assert().success();
    sdd(&dir)
        .args(["change", "apply", "CHG-001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("auth: +1"));
    assert!(read(&dir, ".sdd/specs/auth/spec.md").contains("REQ-100"));

    sdd(&dir)
        .args(["change", "archive", "CHG-001"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".sdd/archive/"));
    assert!(!dir.path().join(".sdd/changes/CHG-001").exists());

    sdd(&dir)
        .args(["change", "list", "--archived"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Add lockout"));
}

#[test]
fn change_rejected_is_final() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    sdd(&dir)
        .args(["change", "create", "Drop", "sessions", "--spec", "auth"])
        .assert()
        .success();
    sdd(&dir).args(["change", "reject", "CHG-001"]).assert().success();
    sdd(&dir)
        .args(["change", "approve", "CHG-001"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E303"));
}

#[test]
fn change_validate_flags_unknown_modified_requirement() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    sdd(&dir)
        .args(["change", "create", "Tweak", "--spec", "auth"])
        .assert()
        .success();
    write(
        &dir,
        ".sdd/changes/CHG-001/delta.md",
        "---\nchange: CHG-001\n---\n# Delta\n\n## MODIFIED Requirements\n\n### REQ-042: Missing\nThe system MUST exist.\n",
    );

    sdd(&dir)
        .args(["change", "validate", "CHG-001"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("REQ-042"));
}

#[test]
fn unknown_change_is_reported() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sdd(&dir)
        .args(["change", "show", "CHG-404"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E301"));
}

// ---------------------------------------------------------------------------
// sdd sync
// ---------------------------------------------------------------------------

#[test]
fn sync_counts_code_references() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    write(&dir, "src/auth.rs", "// Implements REQ-AUTH-001\npub fn login() {}\n");

    let out = sdd(&dir).args(["--json", "sync"]).assert().success();
    let v: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(v["implemented"], 1);
    assert_eq!(v["total"], 1);
    assert_eq!(v["sync_rate"], 100.0);
}

#[test]
fn sync_below_threshold_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");

    sdd(&dir)
        .args(["sync", "--threshold", "50"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("sync rate 0.00%"));
}

// ---------------------------------------------------------------------------
// sdd export / report / search
// ---------------------------------------------------------------------------

#[test]
fn export_json_to_file() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");

    sdd(&dir)
        .args(["export", "auth", "--format", "json", "--output", "auth.json"])
        .assert()
        .success();
    let v: serde_json::Value = serde_json::from_str(&read(&dir, "auth.json")).unwrap();
    assert!(v.to_string().contains("REQ-AUTH-001"));
}

#[test]
fn export_html_all_specs() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    new_spec(&dir, "billing");

    sdd(&dir)
        .args(["export", "-f", "html", "-o", "specs.html"])
        .assert()
        .success();
    let html = read(&dir, "specs.html");
    assert!(html.contains("<html"));
    assert!(html.contains("Auth"));
    assert!(html.contains("Billing"));
}

#[test]
fn export_rejects_unknown_format() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    sdd(&dir)
        .args(["export", "auth", "-f", "pdf"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E601"));
}

#[test]
fn report_prints_markdown() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");

    sdd(&dir)
        .args(["report", "--no-sync"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("# "))
        .stdout(predicate::str::contains("auth"));
}

#[test]
fn search_finds_spec_by_title() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sdd(&dir)
        .args(["new", "auth", "--title", "Password Login"])
        .assert()
        .success();
    new_spec(&dir, "billing");

    sdd(&dir)
        .args(["search", "password"])
        .assert()
        .success()
        .stdout(predicate::str::contains("auth"))
        .stdout(predicate::str::contains("billing").not());
}

// ---------------------------------------------------------------------------
// sdd constitution / context
// ---------------------------------------------------------------------------

#[test]
fn constitution_bump_updates_version_and_changelog() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sdd(&dir).args(["constitution", "validate"]).assert().success();

    sdd(&dir)
        .args(["constitution", "bump", "minor", "Add", "testability", "rule"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.0.0 -> 1.1.0"));
    assert!(read(&dir, ".sdd/constitution.md").contains("version: 1.1.0"));
    assert!(read(&dir, ".sdd/constitution-changelog.md").contains("## [1.1.0]"));
}

#[test]
fn context_scopes_validation() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "billing/invoices");
    write(
        &dir,
        ".sdd/specs/broken/spec.md",
        "---\nstatus: draft\n---\n# Broken\n",
    );

    sdd(&dir).args(["validate"]).assert().code(2);
    sdd(&dir)
        .args(["context", "set", "billing"])
        .assert()
        .success();
    sdd(&dir).args(["validate"]).assert().success();

    sdd(&dir).args(["context", "clear"]).assert().success();
    sdd(&dir)
        .args(["context", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No active domain"));
}

#[test]
fn context_set_unknown_domain_needs_create() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sdd(&dir)
        .args(["context", "set", "payments"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E004"));
    sdd(&dir)
        .args(["context", "set", "payments", "--create"])
        .assert()
        .success();
    assert!(dir.path().join(".sdd/specs/payments").is_dir());
}

// ---------------------------------------------------------------------------
// sdd reverse
// ---------------------------------------------------------------------------

#[test]
fn reverse_extract_review_finalize() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, "src/billing/invoice.rs", "pub struct Invoice;\n");

    sdd(&dir)
        .args(["reverse", "scan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("billing"));
    sdd(&dir).args(["reverse", "extract"]).assert().success();
    assert!(read(&dir, ".sdd/specs/billing/spec.md").contains("source: reverse-extracted"));

    sdd(&dir)
        .args(["reverse", "review"])
        .assert()
        .success()
        .stdout(predicate::str::contains("billing"));
    sdd(&dir)
        .args(["reverse", "finalize", "billing"])
        .assert()
        .success();
    let spec = read(&dir, ".sdd/specs/billing/spec.md");
    assert!(spec.contains("status: review"));
    assert!(!spec.contains("source: reverse-extracted"));
}

#[test]
fn reverse_require_serena_fails_when_missing() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, "src/billing/invoice.rs", "pub struct Invoice;\n");
    let path = std::env::var("PATH").unwrap_or_default();
    if path
        .split(':')
        .any(|p| Path::new(p).join("serena-mcp-server").exists() || Path::new(p).join("serena").exists())
    {
        return;
    }

    sdd(&dir)
        .args(["reverse", "extract", "--require-serena"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E501"));
}

// ---------------------------------------------------------------------------
// sdd diff
// ---------------------------------------------------------------------------

#[test]
fn diff_reports_added_requirement() {
    if !git_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "initial"]);

    let path = dir.path().join(".sdd/specs/auth/spec.md");
    let spec = std::fs::read_to_string(&path).unwrap().replace(
        "## Scenarios",
        "### REQ-002: Lockout\nThe system SHALL lock accounts after five failures.\n\n## Scenarios",
    );
    std::fs::write(&path, spec).unwrap();

    sdd(&dir)
        .arg("diff")
        .assert()
        .success()
        .stdout(predicate::str::contains("REQ-002"))
        .stdout(predicate::str::contains("Suggested version bump"));
}

#[test]
fn diff_outside_git_exits_with_git_code() {
    if !git_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");
    sdd(&dir).arg("diff").assert().code(4);
}

// ---------------------------------------------------------------------------
// sdd cache
// ---------------------------------------------------------------------------

#[test]
fn cache_stats_and_clear() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    new_spec(&dir, "auth");

    sdd(&dir)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("misses:    1"));
    assert!(dir.path().join(".sdd/cache.json").exists());

    sdd(&dir)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hits:      1"));

    sdd(&dir)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleared."));
    assert!(!dir.path().join(".sdd/cache.json").exists());
}
