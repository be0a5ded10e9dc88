use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tokio::fs;

use crate::formula;
use crate::util::sha256_hex;

pub mod reconcile;

use reconcile::{ChangeKind, Plan, StoredFile};

/// Filesystem effects of applying a plan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub written: usize,
    pub deleted: usize,
}

/// The formula directory of the tap.
#[derive(Clone, Debug)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Formula files belonging to `formula_name`, keyed by their file name.
    pub async fn current(
        &self,
        formula_name: &str,
    ) -> Result<BTreeMap<String, StoredFile>, String> {
        let matcher = formula::file_name_matcher(formula_name)
            .map_err(|e| format!("invalid formula name {formula_name}: {e}"))?;
        let mut found = BTreeMap::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(err) => {
                return Err(format!(
                    "failed to list {}: {err}",
                    self.dir.display()
                ));
            }
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| format!("failed to read formula dir entry: {e}"))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let Some(key) = formula::parse_file_name(&matcher, &name) else {
                continue;
            };
            let bytes = fs::read(entry.path())
                .await
                .map_err(|e| format!("failed to read {}: {e}", entry.path().display()))?;
            found.insert(
                name,
                StoredFile {
                    key,
                    digest: sha256_hex(&bytes),
                },
            );
        }
        debug!(
            "store: {} existing file(s) for {formula_name} in {}",
            found.len(),
            self.dir.display()
        );
        Ok(found)
    }

    /// Carry out a plan. In dry-run mode nothing is touched and the stats stay zero.
    pub async fn apply(&self, plan: &Plan, dry_run: bool) -> Result<ApplyStats, String> {
        let mut stats = ApplyStats::default();
        for change in &plan.changes {
            if change.kind == ChangeKind::Unchanged {
                continue;
            }
            if dry_run {
                info!("store: would {} {}", change.kind, change.file_name);
                continue;
            }
            let path = self.dir.join(&change.file_name);
            match (change.kind, &change.content) {
                (ChangeKind::Delete, _) => match fs::remove_file(&path).await {
                    Ok(()) => stats.deleted += 1,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        debug!("store: {} already gone", change.file_name);
                        continue;
                    }
                    Err(err) => {
                        return Err(format!("failed to remove {}: {err}", path.display()));
                    }
                },
                (_, Some(content)) => {
                    self.write_atomic(&path, content).await?;
                    stats.written += 1;
                }
                (_, None) => {
                    return Err(format!("no content to write for {}", change.file_name));
                }
            }
            info!("store: {} {}", past_tense(change.kind), change.file_name);
        }
        Ok(stats)
    }

    async fn write_atomic(&self, path: &Path, content: &str) -> Result<(), String> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| format!("failed to create formula dir: {e}"))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format!("invalid formula path {}", path.display()))?;
        let tmp = self.dir.join(format!(".{file_name}.tmp"));
        fs::write(&tmp, content.as_bytes())
            .await
            .map_err(|e| format!("failed to write {}: {e}", tmp.display()))?;
        if let Err(err) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(format!("failed to replace {}: {err}", path.display()));
        }
        Ok(())
    }
}

fn past_tense(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Create => "created",
        ChangeKind::Update => "updated",
        ChangeKind::Delete => "removed",
        ChangeKind::Unchanged => "kept",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::engine::models::ManifestKey;
    use crate::storage::reconcile::{Change, plan};

    const PIN_12: ManifestKey = ManifestKey::Pinned { major: 1, minor: 2 };

    fn desired(entries: &[(ManifestKey, &str)]) -> BTreeMap<ManifestKey, String> {
        entries.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    async fn reconcile(
        store: &ManifestStore,
        want: &BTreeMap<ManifestKey, String>,
        dry_run: bool,
    ) -> (Plan, ApplyStats) {
        let current = store.current("tool").await.expect("list");
        let plan = plan("tool", want, &BTreeSet::new(), &current);
        let stats = store.apply(&plan, dry_run).await.expect("apply");
        (plan, stats)
    }

    #[tokio::test]
    async fn missing_dir_has_no_formulas() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ManifestStore::new(dir.path().join("Formula"));
        assert!(store.current("tool").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn second_run_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ManifestStore::new(dir.path().join("Formula"));
        let want = desired(&[(ManifestKey::Latest, "latest"), (PIN_12, "pinned")]);

        let (_, first) = reconcile(&store, &want, false).await;
        assert_eq!(first, ApplyStats { written: 2, deleted: 0 });
        let (plan, second) = reconcile(&store, &want, false).await;
        assert!(plan.is_noop());
        assert_eq!(second, ApplyStats::default());

        let text = std::fs::read_to_string(store.dir().join("tool@1.2.rb")).expect("read");
        assert_eq!(text, "pinned");
    }

    #[tokio::test]
    async fn removes_pins_that_left_the_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ManifestStore::new(dir.path());
        std::fs::write(dir.path().join("tool@1.2.rb"), "old pin").expect("seed");
        std::fs::write(dir.path().join("other@1.2.rb"), "unrelated").expect("seed");

        let (_, stats) = reconcile(&store, &desired(&[(ManifestKey::Latest, "x")]), false).await;
        assert_eq!(stats, ApplyStats { written: 1, deleted: 1 });
        assert!(!dir.path().join("tool@1.2.rb").exists());
        assert!(dir.path().join("other@1.2.rb").exists());
        assert!(dir.path().join("tool.rb").exists());
    }

    #[tokio::test]
    async fn dry_run_plans_the_same_but_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ManifestStore::new(dir.path());
        std::fs::write(dir.path().join("tool.rb"), "old").expect("seed");
        std::fs::write(dir.path().join("tool@1.1.rb"), "stale").expect("seed");
        let want = desired(&[(ManifestKey::Latest, "new"), (PIN_12, "pin")]);

        let current = store.current("tool").await.expect("list");
        let dry_plan = plan("tool", &want, &BTreeSet::new(), &current);
        let stats = store.apply(&dry_plan, true).await.expect("apply");
        assert_eq!(stats, ApplyStats::default());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tool.rb")).expect("read"),
            "old"
        );
        assert!(dir.path().join("tool@1.1.rb").exists());
        assert!(!dir.path().join("tool@1.2.rb").exists());

        let (real_plan, _) = reconcile(&store, &want, false).await;
        assert_eq!(dry_plan, real_plan);
    }

    #[tokio::test]
    async fn leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ManifestStore::new(dir.path());
        reconcile(&store, &desired(&[(ManifestKey::Latest, "x")]), false).await;
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["tool.rb".to_string()]);
    }

    #[tokio::test]
    async fn removes_zero_padded_pin_by_its_real_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ManifestStore::new(dir.path());
        std::fs::write(dir.path().join("tool@01.2.rb"), "padded").expect("seed");
        std::fs::write(dir.path().join("tool@1.2.rb"), "old pin").expect("seed");

        let current = store.current("tool").await.expect("list");
        assert_eq!(current.len(), 2);
        assert_eq!(current["tool@01.2.rb"].key, PIN_12);

        let want = desired(&[(ManifestKey::Latest, "x")]);
        let (_, first) = reconcile(&store, &want, false).await;
        assert_eq!(first, ApplyStats { written: 1, deleted: 2 });
        assert!(!dir.path().join("tool@01.2.rb").exists());
        assert!(!dir.path().join("tool@1.2.rb").exists());

        let (plan, second) = reconcile(&store, &want, false).await;
        assert!(plan.is_noop());
        assert_eq!(second, ApplyStats::default());
    }

    #[tokio::test]
    async fn missing_file_is_not_counted_as_deleted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ManifestStore::new(dir.path());
        let plan = Plan {
            changes: vec![Change {
                key: PIN_12,
                file_name: "tool@1.2.rb".into(),
                kind: ChangeKind::Delete,
                content: None,
            }],
        };
        let stats = store.apply(&plan, false).await.expect("apply");
        assert_eq!(stats, ApplyStats::default());
    }
}
