//! Spec export to HTML, JSON and Markdown.

use crate::error::{Result, SddError};
use crate::spec::Spec;
use handlebars::Handlebars;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// ExportFormat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Html,
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" | "htm" => Ok(ExportFormat::Html),
            "json" => Ok(ExportFormat::Json),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            _ => Err(SddError::UnsupportedFormat(s.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = SddError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Template views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RequirementView {
    id: String,
    title: String,
    level: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct ScenarioView {
    name: String,
    given: Vec<String>,
    when: String,
    then: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SpecView {
    id: String,
    anchor: String,
    title: String,
    status: String,
    created: String,
    depends_on: Vec<String>,
    description: String,
    requirements: Vec<RequirementView>,
    scenarios: Vec<ScenarioView>,
}

impl SpecView {
    fn of(s: &Spec) -> Self {
        Self {
            id: s.id.clone(),
            anchor: anchor(&s.id),
            title: s.title.clone(),
            status: s.status_str().to_string(),
            created: s.frontmatter.created.clone().unwrap_or_default(),
            depends_on: s.depends_on().to_vec(),
            description: s.description.clone(),
            requirements: s
                .requirements
                .iter()
                .map(|r| RequirementView {
                    id: r.id.clone(),
                    title: r.title.clone().unwrap_or_default(),
                    level: r.level.map(|l| l.keyword().to_string()).unwrap_or_default(),
                    description: r.description.clone(),
                })
                .collect(),
            scenarios: s
                .scenarios
                .iter()
                .map(|sc| ScenarioView {
                    name: sc.name.clone(),
                    given: sc.given.clone(),
                    when: sc.when.clone(),
                    then: sc.then.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DocumentView {
    title: String,
    generated: String,
    toc: bool,
    specs: Vec<SpecView>,
}

/// `auth/001-login` → `auth-001-login`.
fn anchor(id: &str) -> String {
    id.replace('/', "-")
}

// ---------------------------------------------------------------------------
// Handlebars
// ---------------------------------------------------------------------------

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:960px;margin:2rem auto;padding:0 1rem;color:#222}\
table{border-collapse:collapse;width:100%;margin:1rem 0}th,td{border:1px solid #ddd;padding:.4rem .6rem;text-align:left;vertical-align:top}\
th{background:#f4f4f4}.status{display:inline-block;padding:.1rem .5rem;border-radius:4px;background:#eef;font-size:.85rem}\
.scenario{border-left:3px solid #88a;padding:.2rem 1rem;margin:1rem 0;background:#fafaff}.kw{font-weight:600}";

const DOCUMENT_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<style>{{{style}}}</style>
</head>
<body>
{{#if toc}}
<h1>{{title}}</h1>
<p>Generated {{generated}}</p>
<nav><ul>
{{#each specs}}<li><a href="#{{anchor}}">{{title}}</a> <span class="status">{{status}}</span></li>
{{/each}}</ul></nav>
{{/if}}
{{#each specs}}
<section id="{{anchor}}">
<h1>{{title}}</h1>
<p><span class="status">{{status}}</span> <code>{{id}}</code>{{#if created}} created {{created}}{{/if}}</p>
{{#if depends_on}}<p>Depends on: {{#each depends_on}}<code>{{this}}</code> {{/each}}</p>{{/if}}
{{#if description}}<p>{{description}}</p>{{/if}}
<h2>Requirements</h2>
<table>
<tr><th>ID</th><th>Level</th><th>Requirement</th></tr>
{{#each requirements}}<tr><td>{{id}}</td><td class="kw">{{level}}</td><td>{{#if title}}<strong>{{title}}</strong><br>{{/if}}{{description}}</td></tr>
{{/each}}</table>
{{#if scenarios}}
<h2>Scenarios</h2>
{{#each scenarios}}<div class="scenario">
<h3>{{name}}</h3>
<ul>
{{#each given}}<li><span class="kw">GIVEN</span> {{this}}</li>
{{/each}}<li><span class="kw">WHEN</span> {{when}}</li>
{{#each then}}<li><span class="kw">THEN</span> {{this}}</li>
{{/each}}</ul>
</div>
{{/each}}
{{/if}}
</section>
{{/each}}
</body>
</html>
"##;

/// Registry with the built-in page templates.
pub(crate) fn registry() -> Result<Handlebars<'static>> {
    let mut hb = Handlebars::new();
    hb.set_strict_mode(false);
    hb.register_template_string("document", DOCUMENT_TEMPLATE)
        .map_err(|e| SddError::Render(e.to_string()))?;
    hb.register_template_string("report", crate::report::REPORT_TEMPLATE)
        .map_err(|e| SddError::Render(e.to_string()))?;
    Ok(hb)
}

pub(crate) fn render<T: Serialize>(name: &str, data: &T) -> Result<String> {
    let hb = registry()?;
    let mut value = serde_json::to_value(data)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("style".to_string(), serde_json::Value::from(STYLE));
    }
    hb.render(name, &value)
        .map_err(|e| SddError::Render(e.to_string()))
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

fn markdown_spec(s: &Spec, heading: &str) -> String {
    let mut out = format!("{heading} {}\n\n", s.title);
    out.push_str("| Field | Value |\n|---|---|\n");
    out.push_str(&format!("| ID | `{}` |\n", s.id));
    out.push_str(&format!("| Status | {} |\n", s.status_str()));
    if let Some(created) = &s.frontmatter.created {
        out.push_str(&format!("| Created | {created} |\n"));
    }
    if !s.depends_on().is_empty() {
        out.push_str(&format!("| Depends on | {} |\n", s.depends_on().join(", ")));
    }
    out.push('\n');
    if !s.description.is_empty() {
        out.push_str(&s.description);
        out.push_str("\n\n");
    }

    let sub = format!("{heading}#");
    out.push_str(&format!("{sub} Requirements\n\n"));
    for r in &s.requirements {
        let level = r.level.map(|l| format!(" ({})", l.keyword())).unwrap_or_default();
        match &r.title {
            Some(t) => out.push_str(&format!("- **{}**{level} {t}: {}\n", r.id, r.description)),
            None => out.push_str(&format!("- **{}**{level} {}\n", r.id, r.description)),
        }
    }
    if !s.scenarios.is_empty() {
        out.push_str(&format!("\n{sub} Scenarios\n\n"));
        for sc in &s.scenarios {
            out.push_str(&format!("{sub}# Scenario: {}\n\n", sc.name));
            for g in &sc.given {
                out.push_str(&format!("- GIVEN {g}\n"));
            }
            if !sc.when.is_empty() {
                out.push_str(&format!("- WHEN {}\n", sc.when));
            }
            for t in &sc.then {
                out.push_str(&format!("- THEN {t}\n"));
            }
            out.push('\n');
        }
    }
    format!("{}\n", out.trim_end())
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

pub fn export_spec(spec: &Spec, fmt: ExportFormat) -> Result<String> {
    match fmt {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(spec)?),
        ExportFormat::Markdown => Ok(markdown_spec(spec, "#")),
        ExportFormat::Html => render(
            "document",
            &DocumentView {
                title: spec.title.clone(),
                generated: today(),
                toc: false,
                specs: vec![SpecView::of(spec)],
            },
        ),
    }
}

/// All specs in one document, with a table of contents for HTML and
/// Markdown.
pub fn export_all(specs: &[Spec], fmt: ExportFormat) -> Result<String> {
    match fmt {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(specs)?),
        ExportFormat::Markdown => {
            let mut out = String::from("# Specifications\n\n## Contents\n\n");
            for s in specs {
                out.push_str(&format!("- [{}](#{}) ({})\n", s.title, anchor(&s.id), s.status_str()));
            }
            for s in specs {
                out.push_str(&format!("\n<a id=\"{}\"></a>\n\n", anchor(&s.id)));
                out.push_str(&markdown_spec(s, "##"));
            }
            Ok(out)
        }
        ExportFormat::Html => render(
            "document",
            &DocumentView {
                title: "Specifications".to_string(),
                generated: today(),
                toc: true,
                specs: specs.iter().map(SpecView::of).collect(),
            },
        ),
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Write `specs` to `output` as one document, or one file per spec under
/// `output_dir` when no output path is given.
pub fn write_export(
    specs: &[Spec],
    fmt: ExportFormat,
    output: Option<&Path>,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    if let Some(out) = output {
        let body = match specs {
            [one] => export_spec(one, fmt)?,
            _ => export_all(specs, fmt)?,
        };
        crate::io::atomic_write(out, body.as_bytes())?;
        return Ok(vec![out.to_path_buf()]);
    }
    let mut written = Vec::with_capacity(specs.len());
    for s in specs {
        let path = output_dir.join(format!("{}.{}", anchor(&s.id), fmt.extension()));
        crate::io::atomic_write(&path, export_spec(s, fmt)?.as_bytes())?;
        written.push(path);
    }
    tracing::info!(count = written.len(), format = %fmt, "exported specs");
    Ok(written)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
