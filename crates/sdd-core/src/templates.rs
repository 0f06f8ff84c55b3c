//! Document templates for scaffolded specs, plans, tasks, change proposals
//! and agent command files.

use crate::spec::Requirement;

/// Marker that opens the managed section in AGENTS.md.
pub const AGENTS_SECTION_START: &str = "<!-- sdd:start -->";
/// Marker that closes the managed section in AGENTS.md.
pub const AGENTS_SECTION_END: &str = "<!-- sdd:end -->";

pub struct SpecTemplate<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub created: &'a str,
    pub depends_on: &'a [String],
    pub feature_number: Option<&'a str>,
    /// Prefix for requirement ids; empty gives plain `REQ-001`.
    pub req_prefix: &'a str,
}

/// Requirement id prefix for a spec id: `auth/001-user-auth` → `USER-AUTH`.
/// Segments without a letter are dropped.
pub fn requirement_prefix(id: &str) -> String {
    let leaf = id.rsplit('/').next().unwrap_or(id);
    leaf.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| s.chars().any(|c| c.is_ascii_alphabetic()))
        .map(|s| s.to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join("-")
}

pub fn requirement_id(prefix: &str, n: u32) -> String {
    if prefix.is_empty() {
        format!("REQ-{n:03}")
    } else {
        format!("REQ-{prefix}-{n:03}")
    }
}

pub fn spec(t: &SpecTemplate<'_>) -> String {
    let mut fm = format!("---\nstatus: draft\ncreated: {}\n", t.created);
    if let Some(n) = t.feature_number {
        fm.push_str(&format!("feature_number: \"{n}\"\n"));
    }
    if !t.depends_on.is_empty() {
        fm.push_str(&format!("depends_on: [{}]\n", t.depends_on.join(", ")));
    }
    fm.push_str("---\n");

    let description = t
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("Describe the problem this feature solves and who it is for.");

    format!(
        "{fm}# {title}

{description}

## Requirements

### {req}: Primary behaviour
The system SHALL describe the primary behaviour of {title}.

## Scenarios

### Scenario: Happy path
- GIVEN the preconditions for {title} hold
- WHEN the user performs the primary action
- THEN the expected outcome is observed

## Non-goals

- List what this feature deliberately does not cover.
",
        title = t.title,
        req = requirement_id(t.req_prefix, 1),
    )
}

pub fn plan(id: &str, title: &str, created: &str) -> String {
    format!(
        "---
spec: {id}
status: draft
created: {created}
---
# Plan: {title}

## Approach

Summarize the technical approach.

## Components

| Component | Change |
|---|---|
| | |

## Risks

-

## Testing

Describe how each requirement in `spec.md` will be verified.
"
    )
}

/// A tasks file with one task per requirement, or a single placeholder.
pub fn tasks(id: &str, title: &str, created: &str, requirements: &[Requirement]) -> String {
    let mut out = format!(
        "---\nspec: {id}\ncreated: {created}\n---\n# Tasks: {title}\n\n"
    );
    if requirements.is_empty() {
        out.push_str(&format!(
            "- [ ] {}: Implement {title}\n",
            crate::feature::generate_task_id(1)
        ));
    } else {
        for (i, req) in requirements.iter().enumerate() {
            let label = req.title.as_deref().unwrap_or(req.description.as_str());
            out.push_str(&format!(
                "- [ ] {}: {} ({})\n",
                crate::feature::generate_task_id(i as u32 + 1),
                crate::io::truncate_chars(label, 80),
                req.id
            ));
        }
    }
    out.push_str(&format!(
        "- [ ] {}: Verify scenarios and update spec status\n",
        crate::feature::generate_task_id(requirements.len().max(1) as u32 + 1)
    ));
    out
}

pub fn proposal(id: &str, title: &str, affected: &[String], created: &str) -> String {
    format!(
        "---
id: {id}
title: \"{quoted}\"
status: draft
created: {created}
affected_specs: [{affected}]
---
# {title}

## Why

Explain the motivation for this change.

## What Changes

-

## Impact

Affected specs: {affected_list}
",
        quoted = title.replace('"', "\\\""),
        affected = affected.join(", "),
        affected_list = if affected.is_empty() {
            "none".to_string()
        } else {
            affected.join(", ")
        },
    )
}

pub fn delta(id: &str, title: &str) -> String {
    format!(
        "---
change: {id}
---
# Delta: {title}

## ADDED Requirements

### REQ-100: New behaviour
The system SHALL describe the new behaviour.

## MODIFIED Requirements

## REMOVED Requirements
"
    )
}

pub fn change_tasks(id: &str, title: &str) -> String {
    format!(
        "---\nchange: {id}\n---\n# Tasks: {title}\n\n- [ ] T001: Update affected specs\n- [ ] T002: Implement the change\n- [ ] T003: Apply and archive the change\n"
    )
}

pub fn constitution(project: &str, today: &str) -> String {
    format!(
        "---
version: 1.0.0
updated: {today}
---
# {project} Constitution

Principles every spec in this project follows.

## Principles

### 1. Specification First
- Every feature MUST have an approved spec before implementation starts.
- Specs SHALL use RFC 2119 keywords for requirements.

### 2. Testability
- Every requirement MUST be covered by at least one GIVEN-WHEN-THEN scenario.
- Code SHOULD reference the requirement ids it implements.

### 3. Simplicity
- Implementations MUST NOT introduce dependencies without recording them in the plan.
"
    )
}

pub fn constitution_changelog_header() -> &'static str {
    "# Constitution Changelog\n\n"
}

pub fn agents_section() -> String {
    format!(
        "{AGENTS_SECTION_START}
## SDD

This project uses spec-driven development. Specs live in `.sdd/specs/<id>/spec.md`.

- `sdd new <name>` creates a spec; fill in requirements with RFC 2119 keywords
  (MUST, SHALL, SHOULD, MAY) and GIVEN / WHEN / THEN scenarios.
- `sdd validate` must pass before a spec moves to `approved`.
- `sdd plan <id>` and `sdd tasks <id>` scaffold the plan and task list.
- Reference requirement ids (`REQ-AUTH-001`) in code and tests; `sdd sync` reports
  coverage.
- Changes to approved specs go through `sdd change create`.
{AGENTS_SECTION_END}"
    )
}

/// Agent command files written to `.claude/commands/` as `(file name, body)`.
pub fn agent_commands() -> Vec<(&'static str, &'static str)> {
    vec![
        ("sdd-new.md", AGENT_NEW),
        ("sdd-validate.md", AGENT_VALIDATE),
        ("sdd-implement.md", AGENT_IMPLEMENT),
        ("sdd-change.md", AGENT_CHANGE),
    ]
}

const AGENT_NEW: &str = r#"---
description: Draft a new spec with sdd
argument-hint: <feature-name> <summary>
---
Run `sdd new $ARGUMENTS` then open the created `spec.md`.
Write one `### REQ-NNN` block per behaviour using RFC 2119 keywords and at
least one `### Scenario:` with GIVEN / WHEN / THEN lines.
Finish with `sdd validate <feature-name>` and fix every error it reports.
"#;

const AGENT_VALIDATE: &str = r#"---
description: Validate specs and fix reported issues
---
Run `sdd validate --json`. For every issue, edit the spec at the reported line.
Repeat until the command exits 0.
"#;

const AGENT_IMPLEMENT: &str = r#"---
description: Implement the next open task of a spec
argument-hint: <spec-id>
---
Run `sdd prepare $ARGUMENTS` and stop if any check fails.
Open `tasks.md`, pick the first unchecked task, implement it and mention the
requirement id in code comments and tests. Mark it done with
`sdd tasks $ARGUMENTS --done <task-id>` and run `sdd sync $ARGUMENTS`.
"#;

const AGENT_CHANGE: &str = r#"---
description: Propose a change to an approved spec
argument-hint: <title> <spec-id>
---
Run `sdd change create "<title>" --specs <spec-id>`. Describe the motivation in
`proposal.md` and the requirement edits in `delta.md` under ADDED, MODIFIED and
REMOVED. Run `sdd change validate <id>` before asking for approval.
"#;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_spec;

    #[test]
    fn spec_template_is_valid() {
        let deps = vec!["auth".to_string()];
        let content = spec(&SpecTemplate {
            title: "User Login",
            description: Some("Users sign in with email."),
            created: "2026-03-01",
            depends_on: &deps,
            feature_number: Some("001"),
            req_prefix: "USER-LOGIN",
        });
        let parsed = parse_spec(&content).unwrap();
        assert_eq!(parsed.title, "User Login");
        assert_eq!(parsed.description, "Users sign in with email.");
        assert_eq!(parsed.depends_on(), ["auth".to_string()]);
        assert_eq!(parsed.requirements[0].id, "REQ-USER-LOGIN-001");
        assert!(parsed.scenarios[0].is_complete());
        assert_eq!(
            parsed.frontmatter.extra_str("feature_number"),
            Some("001")
        );
    }

    #[test]
    fn validated_template_has_no_issues() {
        let content = spec(&SpecTemplate {
            title: "Billing",
            description: None,
            created: "2026-03-01",
            depends_on: &[],
            feature_number: None,
            req_prefix: "",
        });
        let issues = crate::validate::validate_content(&content, &Default::default());
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn tasks_template_numbers_per_requirement() {
        let spec = parse_spec(&spec(&SpecTemplate {
            title: "X",
            description: None,
            created: "2026-03-01",
            depends_on: &[],
            feature_number: None,
            req_prefix: "",
        }))
        .unwrap();
        let out = tasks("x", "X", "2026-03-01", &spec.requirements);
        assert!(out.contains("- [ ] T001: Primary behaviour (REQ-001)"));
        assert!(out.contains("- [ ] T002: Verify scenarios"));
    }

    #[test]
    fn requirement_ids_carry_spec_prefix() {
        assert_eq!(requirement_prefix("auth"), "AUTH");
        assert_eq!(requirement_prefix("billing/001-user-auth"), "USER-AUTH");
        assert_eq!(requirement_prefix("2fa"), "2FA");
        assert_eq!(requirement_prefix("001"), "");
        assert_eq!(requirement_id("USER-AUTH", 1), "REQ-USER-AUTH-001");
        assert_eq!(requirement_id("", 12), "REQ-012");
    }

    #[test]
    fn agents_section_is_delimited() {
        let s = agents_section();
        assert!(s.starts_with(AGENTS_SECTION_START));
        assert!(s.ends_with(AGENTS_SECTION_END));
    }
}
