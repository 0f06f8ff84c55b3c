use anyhow::Context;
use sdd_core::{
    config::Config,
    feature::Counter,
    io, paths,
    templates::{self, AGENTS_SECTION_END, AGENTS_SECTION_START},
};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let project_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();

    println!("Initializing sdd in: {}", root.display());

    for dir in [
        paths::SDD_DIR,
        paths::SPECS_DIR,
        paths::CHANGES_DIR,
        paths::ARCHIVE_DIR,
        paths::TEMPLATES_DIR,
    ] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    if paths::counter_path(root).exists() {
        println!("  exists:  {}", paths::COUNTER_FILE);
    } else {
        Counter { next: 1 }
            .save(root)
            .context("failed to write counter.json")?;
        println!("  created: {}", paths::COUNTER_FILE);
    }

    let constitution = templates::constitution(&project_name, &today);
    report(
        paths::CONSTITUTION_FILE,
        io::write_if_missing(&paths::constitution_path(root), constitution.as_bytes())?,
    );
    report(
        paths::CONSTITUTION_CHANGELOG,
        io::write_if_missing(
            &paths::constitution_changelog_path(root),
            templates::constitution_changelog_header().as_bytes(),
        )?,
    );

    for (file, body) in template_copies() {
        let rel = format!("{}/{file}", paths::TEMPLATES_DIR);
        report(&rel, io::write_if_missing(&root.join(&rel), body.as_bytes())?);
    }

    write_agents_md(root, &project_name)?;

    for (file, body) in templates::agent_commands() {
        let rel = format!("{}/{file}", paths::CLAUDE_COMMANDS_DIR);
        report(&rel, io::write_if_missing(&root.join(&rel), body.as_bytes())?);
    }

    io::ensure_gitignore_entry(root, paths::CACHE_FILE)?;

    println!("\nNext: sdd new <feature-name>");
    Ok(())
}

fn report(rel: &str, created: bool) {
    if created {
        println!("  created: {rel}");
    } else {
        println!("  exists:  {rel}");
    }
}

/// Blank documents copied into `.sdd/templates/` for hand-written specs.
fn template_copies() -> Vec<(&'static str, String)> {
    let date = "YYYY-MM-DD";
    vec![
        (
            paths::SPEC_MD,
            templates::spec(&templates::SpecTemplate {
                title: "Feature Title",
                description: None,
                created: date,
                depends_on: &[],
                feature_number: None,
                req_prefix: "",
            }),
        ),
        (paths::PLAN_MD, templates::plan("feature-id", "Feature Title", date)),
        (
            paths::TASKS_MD,
            templates::tasks("feature-id", "Feature Title", date, &[]),
        ),
        (
            paths::PROPOSAL_MD,
            templates::proposal("CHG-000", "Change title", &[], date),
        ),
        (paths::DELTA_MD, templates::delta("CHG-000", "Change title")),
    ]
}

/// Create AGENTS.md or refresh the managed section between the sdd markers.
fn write_agents_md(root: &Path, project_name: &str) -> anyhow::Result<()> {
    let path = paths::agents_md_path(root);
    let section = templates::agents_section();

    if !path.exists() {
        let content = format!("# AGENTS.md\n\nAgent instructions for {project_name}.\n\n{section}\n");
        io::atomic_write(&path, content.as_bytes())?;
        println!("  created: {}", paths::AGENTS_MD);
        return Ok(());
    }

    let existing = std::fs::read_to_string(&path)?;
    if existing.contains(AGENTS_SECTION_START) {
        if io::replace_between_markers(&path, AGENTS_SECTION_START, AGENTS_SECTION_END, &section)? {
            println!("  updated: {} (sdd section refreshed)", paths::AGENTS_MD);
        } else {
            println!(
                "  warning: {} has sdd:start but no sdd:end marker, skipped",
                paths::AGENTS_MD
            );
        }
    } else {
        io::append_text(&path, &format!("\n\n{section}\n"))?;
        println!("  updated: {} (sdd section added)", paths::AGENTS_MD);
    }
    Ok(())
}
