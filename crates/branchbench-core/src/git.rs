use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

/// A branch checked out into its own working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonedRepo {
    pub branch: String,
    pub path: PathBuf,
}

/// Clone `source` into `destination` with `branch` checked out.
pub fn clone(source: &str, destination: &Path, branch: &str) -> Result<()> {
    let output = std::process::Command::new("git")
        .arg("clone")
        .arg(source)
        .arg(destination)
        .args(["-b", branch])
        .output()
        .context("Failed to run git clone")?;

    if !output.status.success() {
        bail!(
            "git clone of '{}' (branch '{}') failed: {}",
            source,
            branch,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

/// Pull the current branch of the clone at `cwd`.
pub fn pull(cwd: &Path) -> Result<()> {
    let output = std::process::Command::new("git")
        .arg("pull")
        .current_dir(cwd)
        .output()
        .with_context(|| format!("Failed to run git pull in {}", cwd.display()))?;

    if !output.status.success() {
        bail!(
            "git pull in '{}' failed: {}",
            cwd.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

/// Switch the clone at `cwd` to `branch`.
pub fn checkout(cwd: &Path, branch: &str) -> Result<()> {
    let output = std::process::Command::new("git")
        .args(["checkout", "-q", branch])
        .current_dir(cwd)
        .output()
        .with_context(|| format!("Failed to checkout branch '{}'", branch))?;

    if !output.status.success() {
        bail!(
            "git checkout '{}' in '{}' failed: {}",
            branch,
            cwd.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

/// Directory name for a branch's clone. Slashes in branch names
/// (`feature/x`) would otherwise create nested directories.
pub fn clone_dir_name(branch: &str) -> String {
    branch.replace(['/', '\\'], "__")
}

/// Make sure an up-to-date clone of `branch` exists under `working_dir`.
///
/// Clones when the branch directory is missing. An existing clone is put
/// back on `branch` and pulled.
pub fn prepare_clone(source: &str, working_dir: &Path, branch: &str) -> Result<ClonedRepo> {
    let destination = working_dir.join(clone_dir_name(branch));

    if destination.exists() {
        info!(branch, path = %destination.display(), "pulling existing clone");
        checkout(&destination, branch)?;
        pull(&destination)?;
    } else {
        std::fs::create_dir_all(working_dir).with_context(|| {
            format!(
                "Failed to create working directory {}",
                working_dir.display()
            )
        })?;
        info!(branch, path = %destination.display(), "cloning");
        clone(source, &destination, branch)?;
    }

    Ok(ClonedRepo {
        branch: branch.to_string(),
        path: destination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "bench")
            .env("GIT_AUTHOR_EMAIL", "bench@example.com")
            .env("GIT_COMMITTER_NAME", "bench")
            .env("GIT_COMMITTER_EMAIL", "bench@example.com")
            .status()
            .expect("run git");
        assert!(status.success(), "git {:?} failed", args);
    }

    fn init_origin(dir: &Path) {
        git(dir, &["init", "-q", "-b", "main"]);
        std::fs::write(dir.join("README.md"), "hello\n").expect("write file");
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "initial"]);
        git(dir, &["checkout", "-q", "-b", "feature/fast"]);
        std::fs::write(dir.join("fast.txt"), "fast\n").expect("write file");
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "fast"]);
        git(dir, &["checkout", "-q", "main"]);
    }

    #[test]
    fn test_clone_dir_name_flattens_slashes() {
        assert_eq!(clone_dir_name("main"), "main");
        assert_eq!(clone_dir_name("feature/fast"), "feature__fast");
    }

    #[test]
    fn test_prepare_clone_clones_then_pulls() {
        let origin = tempfile::tempdir().expect("create origin dir");
        init_origin(origin.path());
        let work = tempfile::tempdir().expect("create work dir");
        let source = origin.path().display().to_string();

        let repo = prepare_clone(&source, work.path(), "feature/fast").expect("clone");
        assert_eq!(repo.branch, "feature/fast");
        assert_eq!(repo.path, work.path().join("feature__fast"));
        assert!(repo.path.join("fast.txt").exists());

        // Second call finds the clone and pulls instead.
        let again = prepare_clone(&source, work.path(), "feature/fast").expect("pull");
        assert_eq!(again, repo);
    }

    #[test]
    fn test_clone_unknown_branch_fails() {
        let origin = tempfile::tempdir().expect("create origin dir");
        init_origin(origin.path());
        let work = tempfile::tempdir().expect("create work dir");

        let err = prepare_clone(
            &origin.path().display().to_string(),
            work.path(),
            "does-not-exist",
        )
        .expect_err("unknown branch");
        assert!(err.to_string().contains("does-not-exist"));
    }

    #[test]
    fn test_prepare_clone_restores_switched_clone() {
        let origin = tempfile::tempdir().expect("create origin dir");
        init_origin(origin.path());
        let work = tempfile::tempdir().expect("create work dir");
        let source = origin.path().display().to_string();

        let repo = prepare_clone(&source, work.path(), "feature/fast").expect("clone");
        git(&repo.path, &["checkout", "-q", "main"]);
        assert!(!repo.path.join("fast.txt").exists());

        prepare_clone(&source, work.path(), "feature/fast").expect("pull");
        assert!(repo.path.join("fast.txt").exists());
    }

    #[test]
    fn test_checkout_switches_branch() {
        let origin = tempfile::tempdir().expect("create origin dir");
        init_origin(origin.path());
        checkout(origin.path(), "feature/fast").expect("checkout");
        assert!(origin.path().join("fast.txt").exists());
        assert!(checkout(origin.path(), "nope").is_err());
    }
}
