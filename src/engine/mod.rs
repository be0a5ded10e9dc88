use std::collections::{BTreeMap, BTreeSet};

use futures_util::StreamExt;
use futures_util::stream;
use log::{debug, error, info, warn};

use crate::config::ProjectConfig;
use crate::engine::models::{ManifestKey, ResolvedAsset};
use crate::engine::state::{ProjectOutcome, ProjectReport, RunReport};
use crate::error::ProjectError;
use crate::formula;
use crate::networking::ReleaseSource;
use crate::selector;
use crate::storage::ManifestStore;
use crate::storage::reconcile;
use crate::synth;

pub mod models;
pub mod state;

pub const DEFAULT_JOBS: usize = 4;

/// Drives selection, synthesis and reconciliation for each configured project.
pub struct GeneratorEngine<S> {
    source: S,
    store: ManifestStore,
    dry_run: bool,
    jobs: usize,
}

impl<S: ReleaseSource> GeneratorEngine<S> {
    pub fn new(source: S, store: ManifestStore, dry_run: bool, jobs: usize) -> Self {
        Self {
            source,
            store,
            dry_run,
            jobs: jobs.max(1),
        }
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Process every project, at most `jobs` at a time. One project failing
    /// never stops the others.
    pub async fn run(&self, projects: &[ProjectConfig]) -> RunReport {
        info!(
            "engine: processing {} project(s) into {}{}",
            projects.len(),
            self.store.dir().display(),
            if self.dry_run { " (dry run)" } else { "" }
        );
        let outcomes = stream::iter(projects.iter().map(|project| self.run_project(project)))
            .buffered(self.jobs)
            .collect::<Vec<_>>()
            .await;
        RunReport { outcomes }
    }

    async fn run_project(&self, project: &ProjectConfig) -> ProjectOutcome {
        match self.process_project(project).await {
            Ok(report) => ProjectOutcome::Generated(report),
            Err(err) => {
                error!("engine: {} failed: {err}", project.repo);
                ProjectOutcome::Failed {
                    repo: project.repo.clone(),
                    error: err,
                }
            }
        }
    }

    pub async fn process_project(
        &self,
        project: &ProjectConfig,
    ) -> Result<ProjectReport, ProjectError> {
        info!("engine: processing {}", project.repo);

        let repo_info = if synth::needs_repo_info(project) {
            Some(self.source.repo_info(&project.repo).await?)
        } else {
            None
        };
        let metadata = synth::resolve_metadata(project, repo_info.as_ref());
        let formula_name = metadata.formula_name().to_string();

        let releases = self.source.releases(&project.repo).await?;
        let selected = selector::select(&releases, project.keep_versions as usize);
        let Some(latest) = selected.get(&ManifestKey::Latest).map(|r| r.version) else {
            return Err(ProjectError::NoReleases);
        };
        info!(
            "engine: {} latest {latest}, generating {}",
            metadata.name,
            selected
                .values()
                .map(|r| r.version.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut desired = BTreeMap::new();
        let mut held = BTreeSet::new();
        let mut warnings = Vec::new();
        for (key, release) in &selected {
            let file_name = formula::file_name(&formula_name, *key);
            let assets = match synth::resolve_assets(release, project) {
                Ok(assets) => assets,
                Err(err) => {
                    warn!("engine: {}: skipping {file_name}: {err}", project.repo);
                    warnings.push(format!("{file_name}: {err}"));
                    held.insert(*key);
                    continue;
                }
            };

            let mut resolved = BTreeMap::new();
            for (platform, asset) in assets {
                let sha256 = self.source.checksum(asset).await?;
                resolved.insert(
                    platform,
                    ResolvedAsset {
                        url: asset.url.clone(),
                        sha256,
                    },
                );
            }
            let record = synth::synthesize(*key, release, resolved, &metadata);
            debug!("engine: rendered {file_name} for {}", record.version);
            desired.insert(*key, formula::render(&record));
        }

        if desired.is_empty() {
            return Err(ProjectError::NothingGenerated(held.len()));
        }

        let current = self
            .store
            .current(&formula_name)
            .await
            .map_err(ProjectError::Store)?;
        let plan = reconcile::plan(&formula_name, &desired, &held, &current);
        if plan.is_noop() {
            info!("engine: {formula_name} is up to date");
        }
        if self.dry_run {
            print!("{}", plan.preview(&latest.to_string()));
        }
        let stats = self
            .store
            .apply(&plan, self.dry_run)
            .await
            .map_err(ProjectError::Store)?;

        Ok(ProjectReport {
            repo: project.repo.clone(),
            formula_name,
            latest: Some(latest),
            plan,
            stats,
            warnings,
        })
    }
}
