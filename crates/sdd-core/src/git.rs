//! Thin wrapper over the `git` binary.

use crate::error::{Result, SddError};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Revision meaning "the working tree" rather than a commit.
pub const WORKTREE: &str = "WORKTREE";

fn git_bin() -> Result<PathBuf> {
    which::which("git").map_err(|_| SddError::NotGitRepo("git executable not found on PATH".to_string()))
}

/// Run git in `root` and return stdout. Non-zero exit is `E401`.
fn run(root: &Path, args: &[&str]) -> Result<String> {
    let bin = git_bin()?;
    tracing::debug!(args = ?args, "git");
    let output = Command::new(bin)
        .args(args)
        .current_dir(root)
        .output()
        .map_err(|e| SddError::Git(e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SddError::Git(format!(
            "git {}: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn is_available() -> bool {
    git_bin().is_ok()
}

pub fn is_repo(root: &Path) -> bool {
    run(root, &["rev-parse", "--is-inside-work-tree"])
        .map(|out| out.trim() == "true")
        .unwrap_or(false)
}

/// Fail with `E402` unless `root` is inside a git work tree.
pub fn ensure_repo(root: &Path) -> Result<()> {
    git_bin()?;
    if is_repo(root) {
        Ok(())
    } else {
        Err(SddError::NotGitRepo(root.display().to_string()))
    }
}

/// Content of `path` (relative to `root`) at `rev`; `None` when the
/// file does not exist at that revision.
pub fn show_file(root: &Path, rev: &str, path: &str) -> Result<Option<String>> {
    if rev == WORKTREE {
        return crate::io::read_optional(&root.join(path));
    }
    let spec = format!("{rev}:./{path}");
    let exists = run(root, &["cat-file", "-e", &spec]).is_ok();
    if !exists {
        // Distinguish a bad revision from a missing path.
        run(root, &["rev-parse", "--verify", "--quiet", &format!("{rev}^{{commit}}")])?;
        return Ok(None);
    }
    run(root, &["show", &spec]).map(Some)
}

/// Files changed between `from` and `to` under `pathspec`, relative to
/// `root`. `to == WORKTREE` compares against the working tree, untracked
/// files included.
pub fn changed_files(root: &Path, from: &str, to: &str, pathspec: &str) -> Result<Vec<String>> {
    let mut files: Vec<String> = if to == WORKTREE {
        let mut tracked: Vec<String> = run(root, &["diff", "--name-only", "--relative", from, "--", pathspec])?
            .lines()
            .map(str::to_string)
            .collect();
        let untracked = run(
            root,
            &["ls-files", "--others", "--exclude-standard", "--", pathspec],
        )?;
        tracked.extend(untracked.lines().map(str::to_string));
        tracked
    } else {
        run(root, &["diff", "--name-only", "--relative", from, to, "--", pathspec])?
            .lines()
            .map(str::to_string)
            .collect()
    };
    files.retain(|f| !f.is_empty());
    files.sort();
    files.dedup();
    Ok(files)
}

pub fn current_branch(root: &Path) -> Result<String> {
    Ok(run(root, &["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string())
}

/// Paths staged in the index.
pub fn staged(root: &Path) -> Result<Vec<String>> {
    Ok(run(root, &["diff", "--cached", "--name-only"])?
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Absolute path of the repository top level.
pub fn toplevel(root: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(run(root, &["rev-parse", "--show-toplevel"])?.trim()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::process::Command;

    /// Initialise a repo with a fixed identity. Returns false when git is
    /// not installed so callers can skip.
    pub fn init_repo(root: &Path) -> bool {
        if which::which("git").is_err() {
            return false;
        }
        git(root, &["init", "-q", "-b", "main"]);
        git(root, &["config", "user.email", "test@example.com"]);
        git(root, &["config", "user.name", "Test"]);
        git(root, &["config", "commit.gpgsign", "false"]);
        true
    }

    pub fn commit_all(root: &Path, msg: &str) {
        git(root, &["add", "-A"]);
        git(root, &["commit", "-q", "-m", msg]);
    }

    pub fn git(root: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(root)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn not_a_repo() {
        let dir = TempDir::new().unwrap();
        if !is_available() {
            return;
        }
        assert!(!is_repo(dir.path()));
        assert_eq!(ensure_repo(dir.path()).unwrap_err().code(), "E402");
    }

    #[test]
    fn show_and_changed_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        if !init_repo(root) {
            return;
        }
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/a.md"), "v1\n").unwrap();
        commit_all(root, "first");

        std::fs::write(root.join("docs/a.md"), "v2\n").unwrap();
        std::fs::write(root.join("docs/b.md"), "new\n").unwrap();

        assert_eq!(show_file(root, "HEAD", "docs/a.md").unwrap().as_deref(), Some("v1\n"));
        assert_eq!(show_file(root, "HEAD", "docs/b.md").unwrap(), None);
        assert_eq!(
            show_file(root, WORKTREE, "docs/a.md").unwrap().as_deref(),
            Some("v2\n")
        );
        assert_eq!(
            changed_files(root, "HEAD", WORKTREE, "docs").unwrap(),
            vec!["docs/a.md", "docs/b.md"]
        );
        assert_eq!(current_branch(root).unwrap(), "main");
        assert_eq!(
            show_file(root, "no-such-rev", "docs/a.md").unwrap_err().code(),
            "E401"
        );
    }
}
