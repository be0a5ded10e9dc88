use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::engine::models::Platform;
use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    projects: Vec<ProjectEntry>,
}

/// Projects may be listed as a bare `owner/name` string or a full mapping.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProjectEntry {
    Repo(String),
    Detailed(ProjectConfig),
}

/// One tracked project, as written in `projects.yaml`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub repo: String,
    #[serde(default)]
    pub keep_versions: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub binary_name: Option<String>,
    /// Platforms that must resolve for a formula to be generated. All when absent.
    #[serde(default)]
    pub platforms: Option<Vec<Platform>>,
    #[serde(default)]
    pub asset_patterns: BTreeMap<Platform, String>,
}

impl ProjectConfig {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Default::default()
        }
    }

    /// Last path segment of the repository, e.g. `tool` for `owner/tool`.
    pub fn repo_name(&self) -> &str {
        self.repo.rsplit('/').next().unwrap_or(&self.repo)
    }

    pub fn display_name(&self) -> &str {
        non_empty(self.name.as_deref()).unwrap_or_else(|| self.repo_name())
    }

    pub fn formula_name(&self) -> &str {
        non_empty(self.binary_name.as_deref()).unwrap_or_else(|| self.display_name())
    }

    pub fn required_platforms(&self) -> Vec<Platform> {
        match &self.platforms {
            Some(list) => {
                let mut list = list.clone();
                list.sort();
                list.dedup();
                list
            }
            None => Platform::ALL.to_vec(),
        }
    }

    /// Whether `id` names this project by repo, display name, or repo name.
    pub fn matches(&self, id: &str) -> bool {
        id == self.repo || id == self.display_name() || id == self.repo_name()
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Read and validate the project list.
pub fn load_config(path: &Path) -> Result<Vec<ProjectConfig>, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let projects = parse_config(&contents).map_err(|err| match err {
        ParseFailure::Yaml(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        ParseFailure::Invalid(msg) => ConfigError::Invalid(msg),
    })?;
    debug!(
        "config: loaded {} project(s) from {}",
        projects.len(),
        path.display()
    );
    Ok(projects)
}

enum ParseFailure {
    Yaml(serde_yaml::Error),
    Invalid(String),
}

fn parse_config(contents: &str) -> Result<Vec<ProjectConfig>, ParseFailure> {
    // An empty file is an empty project list rather than a parse error.
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: ConfigFile = serde_yaml::from_str(contents).map_err(ParseFailure::Yaml)?;
    let projects: Vec<ProjectConfig> = file
        .projects
        .into_iter()
        .map(|entry| match entry {
            ProjectEntry::Repo(repo) => ProjectConfig::new(repo),
            ProjectEntry::Detailed(config) => config,
        })
        .collect();
    validate(&projects).map_err(ParseFailure::Invalid)?;
    Ok(projects)
}

fn validate(projects: &[ProjectConfig]) -> Result<(), String> {
    let mut formula_names = HashSet::new();
    for project in projects {
        let repo = project.repo.trim();
        let mut parts = repo.split('/');
        let valid = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
        );
        if !valid {
            return Err(format!("repo '{}' must look like 'owner/name'", project.repo));
        }
        if let Some(platforms) = &project.platforms
            && platforms.is_empty()
        {
            return Err(format!("{}: platforms must not be empty", project.repo));
        }
        if project.asset_patterns.values().any(|p| p.trim().is_empty()) {
            return Err(format!("{}: asset patterns must not be empty", project.repo));
        }
        if !formula_names.insert(project.formula_name().to_string()) {
            return Err(format!(
                "{}: formula name '{}' is used by another project",
                project.repo,
                project.formula_name()
            ));
        }
    }
    Ok(())
}

/// Narrow the project list to the one named on the command line.
pub fn select_projects(
    projects: Vec<ProjectConfig>,
    filter: Option<&str>,
) -> Result<Vec<ProjectConfig>, ConfigError> {
    let Some(id) = filter else {
        return Ok(projects);
    };
    let selected: Vec<_> = projects.into_iter().filter(|p| p.matches(id)).collect();
    if selected.is_empty() {
        return Err(ConfigError::UnknownProject(id.to_string()));
    }
    Ok(selected)
}
