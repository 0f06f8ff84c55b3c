use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// SpecStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    Draft,
    Review,
    Approved,
    Implementing,
    Implemented,
    Deprecated,
    Archived,
}

impl SpecStatus {
    pub fn all() -> &'static [SpecStatus] {
        &[
            SpecStatus::Draft,
            SpecStatus::Review,
            SpecStatus::Approved,
            SpecStatus::Implementing,
            SpecStatus::Implemented,
            SpecStatus::Deprecated,
            SpecStatus::Archived,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpecStatus::Draft => "draft",
            SpecStatus::Review => "review",
            SpecStatus::Approved => "approved",
            SpecStatus::Implementing => "implementing",
            SpecStatus::Implemented => "implemented",
            SpecStatus::Deprecated => "deprecated",
            SpecStatus::Archived => "archived",
        }
    }

    /// Approved or further along the workflow.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            SpecStatus::Approved | SpecStatus::Implementing | SpecStatus::Implemented
        )
    }
}

impl fmt::Display for SpecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SpecStatus {
    type Err = crate::error::SddError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(SpecStatus::Draft),
            "review" | "in_review" | "in-review" => Ok(SpecStatus::Review),
            "approved" => Ok(SpecStatus::Approved),
            "implementing" | "in_progress" | "in-progress" => Ok(SpecStatus::Implementing),
            "implemented" | "done" | "completed" => Ok(SpecStatus::Implemented),
            "deprecated" => Ok(SpecStatus::Deprecated),
            "archived" => Ok(SpecStatus::Archived),
            _ => Err(crate::error::SddError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RequirementLevel
// ---------------------------------------------------------------------------

/// RFC 2119 requirement level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequirementLevel {
    Must,
    MustNot,
    Shall,
    ShallNot,
    Should,
    ShouldNot,
    May,
}

static KEYWORD_RE: OnceLock<Regex> = OnceLock::new();

fn keyword_re() -> &'static Regex {
    KEYWORD_RE.get_or_init(|| {
        Regex::new(
            r"\b(MUST NOT|SHALL NOT|SHOULD NOT|MUST|SHALL|SHOULD|MAY|REQUIRED|RECOMMENDED|OPTIONAL)\b",
        )
        .unwrap()
    })
}

impl RequirementLevel {
    pub fn keyword(self) -> &'static str {
        match self {
            RequirementLevel::Must => "MUST",
            RequirementLevel::MustNot => "MUST NOT",
            RequirementLevel::Shall => "SHALL",
            RequirementLevel::ShallNot => "SHALL NOT",
            RequirementLevel::Should => "SHOULD",
            RequirementLevel::ShouldNot => "SHOULD NOT",
            RequirementLevel::May => "MAY",
        }
    }

    /// Obligation strength: MAY 1, SHOULD 2, SHALL / MUST 3.
    pub fn strength(self) -> u8 {
        match self {
            RequirementLevel::May => 1,
            RequirementLevel::Should | RequirementLevel::ShouldNot => 2,
            RequirementLevel::Must
            | RequirementLevel::MustNot
            | RequirementLevel::Shall
            | RequirementLevel::ShallNot => 3,
        }
    }

    pub fn is_negative(self) -> bool {
        matches!(
            self,
            RequirementLevel::MustNot | RequirementLevel::ShallNot | RequirementLevel::ShouldNot
        )
    }

    /// First uppercase RFC 2119 keyword in `text`, if any.
    pub fn detect(text: &str) -> Option<Self> {
        let m = keyword_re().find(text)?;
        Self::from_keyword(m.as_str())
    }

    fn from_keyword(kw: &str) -> Option<Self> {
        match kw {
            "MUST" | "REQUIRED" => Some(RequirementLevel::Must),
            "MUST NOT" => Some(RequirementLevel::MustNot),
            "SHALL" => Some(RequirementLevel::Shall),
            "SHALL NOT" => Some(RequirementLevel::ShallNot),
            "SHOULD" | "RECOMMENDED" => Some(RequirementLevel::Should),
            "SHOULD NOT" => Some(RequirementLevel::ShouldNot),
            "MAY" | "OPTIONAL" => Some(RequirementLevel::May),
            _ => None,
        }
    }
}

impl fmt::Display for RequirementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

// ---------------------------------------------------------------------------
// ChangeStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Draft,
    Proposed,
    Approved,
    Applied,
    Archived,
    Rejected,
}

impl ChangeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeStatus::Draft => "draft",
            ChangeStatus::Proposed => "proposed",
            ChangeStatus::Approved => "approved",
            ChangeStatus::Applied => "applied",
            ChangeStatus::Archived => "archived",
            ChangeStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeStatus {
    type Err = crate::error::SddError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(ChangeStatus::Draft),
            "proposed" => Ok(ChangeStatus::Proposed),
            "approved" => Ok(ChangeStatus::Approved),
            "applied" => Ok(ChangeStatus::Applied),
            "archived" => Ok(ChangeStatus::Archived),
            "rejected" => Ok(ChangeStatus::Rejected),
            _ => Err(crate::error::SddError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn detect_prefers_negative_form() {
        assert_eq!(
            RequirementLevel::detect("The API MUST NOT leak tokens"),
            Some(RequirementLevel::MustNot)
        );
        assert_eq!(
            RequirementLevel::detect("Users SHOULD log in"),
            Some(RequirementLevel::Should)
        );
        assert_eq!(RequirementLevel::detect("users may log in"), None);
    }

    #[test]
    fn detect_ignores_substrings() {
        assert_eq!(RequirementLevel::detect("MAYBE later, SHALLOW copy"), None);
    }

    #[test]
    fn strength_ordering() {
        assert!(RequirementLevel::Shall.strength() > RequirementLevel::Should.strength());
        assert!(RequirementLevel::Should.strength() > RequirementLevel::May.strength());
        assert_eq!(
            RequirementLevel::Must.strength(),
            RequirementLevel::Shall.strength()
        );
    }

    #[test]
    fn status_parse_aliases() {
        assert_eq!(SpecStatus::from_str("Draft").unwrap(), SpecStatus::Draft);
        assert_eq!(
            SpecStatus::from_str("in-progress").unwrap(),
            SpecStatus::Implementing
        );
        assert!(SpecStatus::from_str("bogus").is_err());
    }

    #[test]
    fn level_serializes_as_keyword_case() {
        let json = serde_json::to_string(&RequirementLevel::ShallNot).unwrap();
        assert_eq!(json, "\"SHALL_NOT\"");
    }
}
