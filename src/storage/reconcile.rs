use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::Write;

use crate::engine::models::ManifestKey;
use crate::formula;
use crate::util::sha256_hex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Unchanged,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
            ChangeKind::Unchanged => "unchanged",
        })
    }
}

/// One decision about one formula file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub key: ManifestKey,
    pub file_name: String,
    pub kind: ChangeKind,
    /// New file content for creates and updates.
    pub content: Option<String>,
}

/// A formula file found on disk, named as it is on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    pub key: ManifestKey,
    /// SHA-256 of the file content.
    pub digest: String,
}

/// The full set of decisions for one formula name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub changes: Vec<Change>,
}

impl Plan {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }

    /// Whether applying the plan would touch the filesystem.
    pub fn is_noop(&self) -> bool {
        self.changes.iter().all(|c| c.kind == ChangeKind::Unchanged)
    }

    /// Every formula the plan would write, each under a `--- name.rb ---` header.
    pub fn preview(&self, latest: &str) -> String {
        let mut out = String::new();
        for change in &self.changes {
            let Some(content) = &change.content else {
                continue;
            };
            match change.key {
                ManifestKey::Latest => {
                    let _ = writeln!(out, "\n--- {} (latest: {latest}) ---", change.file_name);
                }
                ManifestKey::Pinned { .. } => {
                    let _ = writeln!(out, "\n--- {} ---", change.file_name);
                }
            }
            out.push_str(content);
        }
        out
    }
}

/// Diff the desired formulas against what is on disk.
///
/// `desired` maps keys to rendered text, `current` maps file names found on
/// disk to their key and digest. Keys in `held` were selected but could not be
/// generated this run, so their existing files are kept. A file whose name is
/// not the canonical one for its key (`tool@01.2.rb`) is removed unless held.
pub fn plan(
    formula_name: &str,
    desired: &BTreeMap<ManifestKey, String>,
    held: &BTreeSet<ManifestKey>,
    current: &BTreeMap<String, StoredFile>,
) -> Plan {
    let mut changes = Vec::new();
    for (key, content) in desired {
        let file_name = formula::file_name(formula_name, *key);
        let kind = match current.get(&file_name) {
            None => ChangeKind::Create,
            Some(stored) if stored.digest != sha256_hex(content.as_bytes()) => ChangeKind::Update,
            Some(_) => ChangeKind::Unchanged,
        };
        changes.push(Change {
            key: *key,
            file_name,
            kind,
            content: (kind != ChangeKind::Unchanged).then(|| content.clone()),
        });
    }
    for (file_name, stored) in current {
        let canonical = formula::file_name(formula_name, stored.key) == *file_name;
        if held.contains(&stored.key) || (canonical && desired.contains_key(&stored.key)) {
            continue;
        }
        changes.push(Change {
            key: stored.key,
            file_name: file_name.clone(),
            kind: ChangeKind::Delete,
            content: None,
        });
    }
    Plan { changes }
}
