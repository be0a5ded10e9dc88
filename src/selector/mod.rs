use std::collections::BTreeMap;

use log::debug;

use crate::engine::models::{ManifestKey, Release, SemVer};

/// Normalize a tag by trimming whitespace and the conventional `v` prefix.
pub fn normalize_version(tag: &str) -> &str {
    let trimmed = tag.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Parse a release tag into a version.
///
/// A missing patch component counts as `0`. Tags with pre-release or build
/// suffixes, extra components, or non-numeric parts are rejected.
pub fn parse_version(tag: &str) -> Option<SemVer> {
    let version = normalize_version(tag);
    if version.contains(['-', '+']) {
        return None;
    }
    let parts = parse_version_parts(version)?;
    match parts.as_slice() {
        [major, minor] => Some(SemVer::new(*major, *minor, 0)),
        [major, minor, patch] => Some(SemVer::new(*major, *minor, *patch)),
        _ => None,
    }
}

/// Parse version string into parts (e.g., "0.1.5" -> [0, 1, 5]).
fn parse_version_parts(version: &str) -> Option<Vec<u64>> {
    version
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// The text a tag carries in front of its version, e.g. `v` for `v1.2.3`.
pub fn tag_prefix(tag: &str) -> &str {
    let trimmed = tag.trim();
    let rest = normalize_version(trimmed);
    &trimmed[..trimmed.len() - rest.len()]
}

/// Pick the releases that must be published as formulas.
///
/// The highest version is always `Latest`. Every other minor line is
/// represented by its highest patch, and the `keep_versions` most recent lines
/// below the latest one become `Pinned`. Input order does not matter.
pub fn select(releases: &[Release], keep_versions: usize) -> BTreeMap<ManifestKey, Release> {
    let mut sorted: Vec<&Release> = releases.iter().collect();
    // Newest first; the tag breaks ties between duplicate versions.
    sorted.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| a.tag.cmp(&b.tag)));

    let mut selected = BTreeMap::new();
    let Some(latest) = sorted.first() else {
        return selected;
    };
    selected.insert(ManifestKey::Latest, (*latest).clone());

    let mut lines: Vec<&Release> = Vec::new();
    for &release in &sorted {
        if release.version.same_minor_line(latest.version) {
            continue;
        }
        // Sorted descending, so the first release seen for a line is its representative.
        if lines
            .last()
            .is_some_and(|prev| prev.version.same_minor_line(release.version))
        {
            continue;
        }
        lines.push(release);
    }

    for release in lines.into_iter().take(keep_versions) {
        let (major, minor) = release.version.minor_line();
        selected.insert(ManifestKey::Pinned { major, minor }, release.clone());
    }

    debug!(
        "select: latest={} pinned={:?}",
        latest.version,
        selected
            .iter()
            .filter(|(key, _)| **key != ManifestKey::Latest)
            .map(|(_, r)| r.version.to_string())
            .collect::<Vec<_>>()
    );
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str) -> Release {
        Release {
            tag: tag.to_string(),
            version: parse_version(tag).unwrap_or_else(|| panic!("bad tag {tag}")),
            assets: Vec::new(),
        }
    }

    fn history() -> Vec<Release> {
        [
            "v1.4.3", "v1.4.2", "v1.3.1", "v1.3.0", "v1.2.5", "v1.2.4", "v1.2.3", "v1.2.2",
            "v1.2.0", "v1.1.2",
        ]
        .into_iter()
        .map(release)
        .collect()
    }

    fn versions(selected: &BTreeMap<ManifestKey, Release>) -> Vec<(ManifestKey, String)> {
        selected
            .iter()
            .map(|(k, r)| (*k, r.version.to_string()))
            .collect()
    }

    #[test]
    fn normalizes_version_strings() {
        assert_eq!(normalize_version("v0.1.5"), "0.1.5");
        assert_eq!(normalize_version("0.1.5"), "0.1.5");
        assert_eq!(normalize_version("  v1.2.3  "), "1.2.3");
    }

    #[test]
    fn parses_tags() {
        assert_eq!(parse_version("v1.2.3"), Some(SemVer::new(1, 2, 3)));
        assert_eq!(parse_version("10.0"), Some(SemVer::new(10, 0, 0)));
        assert_eq!(parse_version("v2.0.0-rc1"), None);
        assert_eq!(parse_version("1.2.3+build"), None);
        assert_eq!(parse_version("1.2.3.4"), None);
        assert_eq!(parse_version("nightly"), None);
        assert_eq!(parse_version("1"), None);
    }

    #[test]
    fn extracts_tag_prefix() {
        assert_eq!(tag_prefix("v1.2.3"), "v");
        assert_eq!(tag_prefix("1.2.3"), "");
    }

    #[test]
    fn keeps_two_minor_lines_below_latest() {
        let selected = select(&history(), 2);
        assert_eq!(
            versions(&selected),
            vec![
                (ManifestKey::Latest, "1.4.3".to_string()),
                (ManifestKey::Pinned { major: 1, minor: 2 }, "1.2.5".to_string()),
                (ManifestKey::Pinned { major: 1, minor: 3 }, "1.3.1".to_string()),
            ]
        );
    }

    #[test]
    fn zero_keep_versions_only_selects_latest() {
        let selected = select(&history(), 0);
        assert_eq!(
            versions(&selected),
            vec![(ManifestKey::Latest, "1.4.3".to_string())]
        );
    }

    #[test]
    fn selects_all_lines_when_fewer_than_requested() {
        let selected = select(&history(), 10);
        assert_eq!(selected.len(), 4);
        assert_eq!(
            selected[&ManifestKey::Pinned { major: 1, minor: 1 }].version,
            SemVer::new(1, 1, 2)
        );
    }

    #[test]
    fn never_pins_latest_minor_line() {
        for keep in 0..6 {
            let selected = select(&history(), keep);
            let pinned: Vec<_> = selected
                .keys()
                .filter(|k| **k != ManifestKey::Latest)
                .collect();
            assert!(pinned.len() <= keep);
            assert!(!selected.contains_key(&ManifestKey::Pinned { major: 1, minor: 4 }));
        }
    }

    #[test]
    fn selection_ignores_input_order() {
        let forward = history();
        let mut reversed = history();
        reversed.reverse();
        let mut shuffled = history();
        shuffled.swap(0, 7);
        shuffled.swap(3, 9);
        let expected = select(&forward, 3);
        assert_eq!(select(&reversed, 3), expected);
        assert_eq!(select(&shuffled, 3), expected);
    }

    #[test]
    fn major_bump_starts_a_new_line() {
        let releases: Vec<Release> = ["2.0.1", "1.9.0", "1.8.4", "2.0.0"]
            .into_iter()
            .map(release)
            .collect();
        let selected = select(&releases, 1);
        assert_eq!(
            versions(&selected),
            vec![
                (ManifestKey::Latest, "2.0.1".to_string()),
                (ManifestKey::Pinned { major: 1, minor: 9 }, "1.9.0".to_string()),
            ]
        );
    }

    #[test]
    fn empty_history_selects_nothing() {
        assert!(select(&[], 3).is_empty());
    }
}
