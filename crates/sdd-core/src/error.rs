use thiserror::Error;

#[derive(Debug, Error)]
pub enum SddError {
    #[error("not initialized: run 'sdd init'")]
    NotInitialized,

    #[error("invalid name '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidName(String),

    #[error("feature already exists: {0}")]
    FeatureExists(String),

    #[error("feature not found: {0}")]
    FeatureNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("frontmatter missing")]
    MissingFrontmatter,

    #[error("invalid frontmatter: {0}")]
    InvalidFrontmatter(String),

    #[error("title missing: add a '# Title' heading")]
    MissingTitle,

    #[error("missing RFC 2119 keyword (SHALL, MUST, SHOULD, MAY)")]
    MissingKeyword,

    #[error("missing GIVEN-WHEN-THEN scenario")]
    MissingScenario,

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("duplicate requirement id: {0}")]
    DuplicateRequirement(String),

    #[error("unknown dependency '{dependency}' in spec '{spec}'")]
    UnknownDependency { spec: String, dependency: String },

    #[error("dependency cycle: {0}")]
    DependencyCycle(String),

    #[error("change not found: {0}")]
    ChangeNotFound(String),

    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    #[error("change '{id}' is {status}: {reason}")]
    InvalidChangeState {
        id: String,
        status: String,
        reason: String,
    },

    #[error("git command failed: {0}")]
    Git(String),

    #[error("not a git repository (or git is not installed): {0}")]
    NotGitRepo(String),

    #[error("Serena MCP is not available: {0}")]
    SerenaUnavailable(String),

    #[error("unsupported export format '{0}': expected html, json or md")]
    UnsupportedFormat(String),

    #[error("constitution error: {0}")]
    Constitution(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("watch error: {0}")]
    Watch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SddError {
    /// Stable error code printed next to messages and carried in JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            SddError::NotInitialized => "E001",
            SddError::InvalidName(_) => "E002",
            SddError::FeatureExists(_) => "E003",
            SddError::FeatureNotFound(_) => "E004",
            SddError::TaskNotFound(_) => "E005",
            SddError::Io(_) => "E101",
            SddError::Yaml(_) => "E102",
            SddError::Json(_) => "E103",
            SddError::MissingFrontmatter => "E201",
            SddError::InvalidFrontmatter(_) => "E202",
            SddError::MissingTitle => "E203",
            SddError::MissingKeyword => "E204",
            SddError::MissingScenario => "E205",
            SddError::InvalidStatus(_) => "E206",
            SddError::DuplicateRequirement(_) => "E207",
            SddError::UnknownDependency { .. } => "E208",
            SddError::DependencyCycle(_) => "E209",
            SddError::ChangeNotFound(_) => "E301",
            SddError::InvalidDelta(_) => "E302",
            SddError::InvalidChangeState { .. } => "E303",
            SddError::Git(_) => "E401",
            SddError::NotGitRepo(_) => "E402",
            SddError::SerenaUnavailable(_) => "E501",
            SddError::UnsupportedFormat(_) => "E601",
            SddError::Render(_) => "E602",
            SddError::Constitution(_) => "E701",
            SddError::Search(_) => "E801",
            SddError::Watch(_) => "E901",
        }
    }

    pub fn is_validation(&self) -> bool {
        self.code().starts_with("E2")
    }

    pub fn is_git(&self) -> bool {
        matches!(self, SddError::Git(_) | SddError::NotGitRepo(_))
    }
}

pub type Result<T> = std::result::Result<T, SddError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_codes() {
        assert_eq!(SddError::MissingKeyword.code(), "E204");
        assert_eq!(SddError::MissingScenario.code(), "E205");
        assert!(SddError::MissingScenario.is_validation());
        assert!(!SddError::NotInitialized.is_validation());
    }

    #[test]
    fn io_errors_map_to_filesystem_code() {
        let err: SddError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.code(), "E101");
    }
}
