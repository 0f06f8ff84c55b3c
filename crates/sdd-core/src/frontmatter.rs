//! YAML frontmatter handling for markdown documents.
//!
//! A document has frontmatter only when its first line is `---` and a later
//! line closes the block with `---`. Everything after the closing fence is
//! the body.

use crate::error::{Result, SddError};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_string")]
    pub updated: Option<String>,
    #[serde(
        default,
        alias = "dependencies",
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many"
    )]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl Frontmatter {
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

/// Dates are often written unquoted; accept any scalar.
pub(crate) fn scalar_string<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(de)?;
    Ok(value.and_then(|v| match v {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }))
}

pub(crate) fn one_or_many<'de, D>(de: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }
    Ok(match OneOrMany::deserialize(de)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}

/// A document split into its raw frontmatter and body.
#[derive(Debug, Clone, Copy)]
pub struct Split<'a> {
    pub yaml: Option<&'a str>,
    pub body: &'a str,
    /// Zero-based line number where the body starts in the original content.
    pub body_start_line: usize,
}

pub fn split(content: &str) -> Split<'_> {
    let no_fm = Split {
        yaml: None,
        body: content,
        body_start_line: 0,
    };
    let first_len = match content.find('\n') {
        Some(i) => i + 1,
        None => return no_fm,
    };
    if content[..first_len].trim_end() != "---" {
        return no_fm;
    }

    let mut offset = first_len;
    let mut line_no = 1;
    while offset < content.len() {
        let rest = &content[offset..];
        let line_len = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
        let line = &rest[..line_len];
        if line.trim_end() == "---" {
            return Split {
                yaml: Some(&content[first_len..offset]),
                body: &content[offset + line_len..],
                body_start_line: line_no + 1,
            };
        }
        offset += line_len;
        line_no += 1;
    }
    no_fm
}

/// Parse the frontmatter block. `Ok(None)` when the document has none.
pub fn parse(content: &str) -> Result<Option<Frontmatter>> {
    let Some(yaml) = split(content).yaml else {
        return Ok(None);
    };
    if yaml.trim().is_empty() {
        return Ok(Some(Frontmatter::default()));
    }
    serde_yaml::from_str(yaml)
        .map(Some)
        .map_err(|e| SddError::InvalidFrontmatter(e.to_string()))
}

/// Set `key: value` inside the frontmatter by string replacement.
///
/// Replaces the first top-level `key:` line, or inserts one before the
/// closing fence. Content without frontmatter gets a new block. The body is
/// never modified.
pub fn set_field(content: &str, key: &str, value: &str) -> String {
    let parts = split(content);
    let new_line = format!("{key}: {value}");
    let Some(yaml) = parts.yaml else {
        return format!("---\n{new_line}\n---\n{content}");
    };

    let prefix = format!("{key}:");
    let mut replaced = false;
    let mut lines: Vec<String> = yaml
        .lines()
        .map(|line| {
            if !replaced && line.starts_with(&prefix) {
                replaced = true;
                new_line.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(new_line);
    }

    let mut out = String::with_capacity(content.len() + key.len() + value.len());
    out.push_str("---\n");
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(parts.body);
    out
}

/// Remove the first top-level `key:` line from the frontmatter.
pub fn remove_field(content: &str, key: &str) -> String {
    let parts = split(content);
    let Some(yaml) = parts.yaml else {
        return content.to_string();
    };
    let prefix = format!("{key}:");
    let mut removed = false;
    let mut out = String::from("---\n");
    for line in yaml.lines() {
        if !removed && line.starts_with(&prefix) {
            removed = true;
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(parts.body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "---\nstatus: draft\ncreated: 2026-01-05\ndepends_on: [auth]\n---\n# Title\n\nBody\n";

    #[test]
    fn split_finds_body() {
        let s = split(DOC);
        assert_eq!(s.yaml.unwrap(), "status: draft\ncreated: 2026-01-05\ndepends_on: [auth]\n");
        assert!(s.body.starts_with("# Title"));
        assert_eq!(s.body_start_line, 5);
    }

    #[test]
    fn split_without_frontmatter() {
        let s = split("# Title\n---\n");
        assert!(s.yaml.is_none());
        assert_eq!(s.body_start_line, 0);
    }

    #[test]
    fn unterminated_frontmatter_is_body() {
        assert!(split("---\nstatus: draft\n# Title\n").yaml.is_none());
    }

    #[test]
    fn parse_fields_and_aliases() {
        let fm = parse(DOC).unwrap().unwrap();
        assert_eq!(fm.status.as_deref(), Some("draft"));
        assert_eq!(fm.created.as_deref(), Some("2026-01-05"));
        assert_eq!(fm.depends_on, vec!["auth".to_string()]);

        let fm = parse("---\ndependencies: a, b\nowner: me\n---\n").unwrap().unwrap();
        assert_eq!(fm.depends_on, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(fm.extra_str("owner"), Some("me"));
    }

    #[test]
    fn parse_invalid_yaml() {
        let err = parse("---\nstatus: [unclosed\n---\n").unwrap_err();
        assert_eq!(err.code(), "E202");
    }

    #[test]
    fn set_field_replaces_in_place() {
        let out = set_field(DOC, "status", "approved");
        assert!(out.contains("status: approved\ncreated: 2026-01-05"));
        assert!(out.ends_with("# Title\n\nBody\n"));
    }

    #[test]
    fn set_field_inserts_missing_key() {
        let out = set_field("---\nstatus: draft\n---\nstatus: body text\n", "updated", "2026-02-01");
        assert_eq!(
            out,
            "---\nstatus: draft\nupdated: 2026-02-01\n---\nstatus: body text\n"
        );
    }

    #[test]
    fn remove_field_drops_line() {
        let out = remove_field("---\nsource: reverse-extracted\nstatus: draft\n---\nx\n", "source");
        assert_eq!(out, "---\nstatus: draft\n---\nx\n");
    }
}
