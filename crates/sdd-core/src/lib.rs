pub mod cache;
pub mod change;
pub mod config;
pub mod constitution;
pub mod context;
pub mod delta;
pub mod diff;
pub mod error;
pub mod export;
pub mod feature;
pub mod frontmatter;
pub mod git;
pub mod graph;
pub mod io;
pub mod paths;
pub mod prepare;
pub mod report;
pub mod reverse;
pub mod search;
pub mod spec;
pub mod sync;
pub mod tasks;
pub mod templates;
pub mod types;
pub mod validate;

pub use error::{Result, SddError};
