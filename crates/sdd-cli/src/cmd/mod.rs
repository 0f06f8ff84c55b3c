pub mod cache;
pub mod change;
pub mod constitution;
pub mod context;
pub mod diff;
pub mod export;
pub mod graph;
pub mod impact;
pub mod init;
pub mod list;
pub mod new;
pub mod plan;
pub mod prepare;
pub mod report;
pub mod reverse;
pub mod search;
pub mod status;
pub mod sync;
pub mod tasks;
pub mod validate;
pub mod watch;

use std::fmt;

/// A check ran and found problems; exits with the validation code.
#[derive(Debug)]
pub struct ValidationFailed(pub String);

impl fmt::Display for ValidationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ValidationFailed {}
