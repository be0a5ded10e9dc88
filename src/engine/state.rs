use crate::engine::models::SemVer;
use crate::error::ProjectError;
use crate::storage::ApplyStats;
use crate::storage::reconcile::{ChangeKind, Plan};

/// What happened to one project during a run.
#[derive(Debug)]
pub struct ProjectReport {
    pub repo: String,
    pub formula_name: String,
    pub latest: Option<SemVer>,
    pub plan: Plan,
    pub stats: ApplyStats,
    /// Formulas skipped because a platform had no asset.
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub enum ProjectOutcome {
    Generated(ProjectReport),
    Failed { repo: String, error: ProjectError },
}

impl ProjectOutcome {
    pub fn repo(&self) -> &str {
        match self {
            ProjectOutcome::Generated(report) => &report.repo,
            ProjectOutcome::Failed { repo, .. } => repo,
        }
    }
}

/// Outcomes of every project processed in one run, in configuration order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<ProjectOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ProjectOutcome::Generated(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn warnings(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                ProjectOutcome::Generated(report) => report.warnings.len(),
                ProjectOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// Files written or removed across all projects.
    pub fn files_touched(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                ProjectOutcome::Generated(report) => report.stats.written + report.stats.deleted,
                ProjectOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// One line per project plus a totals line.
    pub fn summary(&self, dry_run: bool) -> String {
        let mut lines = Vec::with_capacity(self.outcomes.len() + 1);
        for outcome in &self.outcomes {
            match outcome {
                ProjectOutcome::Generated(report) => {
                    let latest = report
                        .latest
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "-".into());
                    let mut line = format!(
                        "  {} ({} {}): {} created, {} updated, {} removed, {} unchanged",
                        report.repo,
                        report.formula_name,
                        latest,
                        report.plan.count(ChangeKind::Create),
                        report.plan.count(ChangeKind::Update),
                        report.plan.count(ChangeKind::Delete),
                        report.plan.count(ChangeKind::Unchanged),
                    );
                    if !report.warnings.is_empty() {
                        line.push_str(&format!(", {} skipped", report.warnings.len()));
                    }
                    lines.push(line);
                }
                ProjectOutcome::Failed { error, .. } => {
                    lines.push(format!("  {}: FAILED: {error}", outcome.repo()));
                }
            }
        }
        lines.push(format!(
            "{}Processed {}/{} projects successfully ({} warning(s))",
            if dry_run { "[dry run] " } else { "" },
            self.succeeded(),
            self.outcomes.len(),
            self.warnings()
        ));
        lines.join("\n")
    }
}
