use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// File name searched for when no explicit config path is given.
pub const CONFIG_FILE_NAME: &str = "branchbench.yaml";

/// Top-level branchbench.yaml configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchConfig {
    /// Repository to clone: a URL or a path (relative paths resolve against the config file)
    pub repository: String,

    /// Branches to benchmark, in order
    pub branches: Vec<String>,

    /// Directory holding one clone per branch
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,

    /// Subdirectory inside each clone where commands run
    #[serde(default = "default_package_path")]
    pub package_path: PathBuf,

    /// Source file (relative to the clone root) modified to trigger a watch rebuild
    pub touch_file: PathBuf,

    /// Commands run in each clone
    #[serde(default)]
    pub commands: CommandsConfig,

    /// Also time a one-shot build between install and watch
    #[serde(default)]
    pub run_build: bool,

    /// Extra environment variables for every command
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Shell commands for each benchmark step
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandsConfig {
    #[serde(default = "default_install")]
    pub install: String,

    #[serde(default = "default_build")]
    pub build: String,

    #[serde(default = "default_watch")]
    pub watch: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            install: default_install(),
            build: default_build(),
            watch: default_watch(),
        }
    }
}

fn default_working_directory() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_package_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_install() -> String {
    "yarn install".to_string()
}

fn default_build() -> String {
    "yarn build".to_string()
}

fn default_watch() -> String {
    "yarn watch".to_string()
}

impl BenchConfig {
    /// Read and parse a config file, resolving relative paths against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        Ok(config.resolve_relative_to(base))
    }

    /// Parse config YAML without touching the filesystem.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: BenchConfig = yaml_serde::from_str(yaml)?;
        if config.branches.is_empty() {
            bail!("`branches` must list at least one branch");
        }
        if config.repository.trim().is_empty() {
            bail!("`repository` must not be empty");
        }
        Ok(config)
    }

    /// Find branchbench.yaml by walking up from `start`.
    pub fn find(start: &Path) -> Result<PathBuf> {
        let mut dir = start;
        loop {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Ok(candidate);
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }

        bail!(
            "Could not find {} in '{}' or any parent directory.\n\
             \n\
             Hint: create one listing `repository`, `branches` and `touchFile`, or pass --config.",
            CONFIG_FILE_NAME,
            start.display()
        )
    }

    /// Check the config for suspicious but non-fatal settings.
    ///
    /// Returns human-readable warnings. The caller decides how to show them.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let mut seen = HashSet::new();
        for branch in &self.branches {
            if !seen.insert(branch.as_str()) {
                warnings.push(format!(
                    "Branch '{}' is listed more than once; it will be benchmarked once",
                    branch
                ));
            }
        }

        if self.touch_file.is_absolute() {
            warnings.push(format!(
                "touchFile '{}' is absolute; it should be relative to the clone root",
                self.touch_file.display()
            ));
        }

        if self.commands.watch.trim().is_empty() {
            warnings.push("commands.watch is empty; the watch step will fail".to_string());
        }

        warnings
    }

    /// Configured branches with duplicates removed, order preserved.
    pub fn unique_branches(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.branches
            .iter()
            .filter(|b| seen.insert(b.as_str()))
            .cloned()
            .collect()
    }

    fn resolve_relative_to(mut self, base: &Path) -> Self {
        if self.working_directory.is_relative() {
            self.working_directory = base.join(&self.working_directory);
        }
        if is_local_relative_path(&self.repository) {
            self.repository = base.join(&self.repository).display().to_string();
        }
        self
    }
}

/// Whether `repository` names a relative filesystem path rather than a URL
/// or an absolute path.
fn is_local_relative_path(repository: &str) -> bool {
    let looks_like_url = repository.contains("://") || repository.contains('@');
    !looks_like_url && Path::new(repository).is_relative()
}
