use std::collections::BTreeMap;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::config::{ProjectConfig, non_empty};
use crate::engine::models::{
    FormulaMetadata, ManifestKey, ManifestRecord, Platform, Release, ReleaseAsset, RepoInfo,
    ResolvedAsset,
};
use crate::error::AssetResolutionError;

const ARCHIVE_EXTENSIONS: [&str; 5] = [".tar.gz", ".tgz", ".zip", ".tar.xz", ".tar.bz2"];
const DEFAULT_LICENSE: &str = "MIT";

// Checked in order; more specific families come first.
const PLATFORM_PATTERNS: [(Platform, &[&str]); 4] = [
    (
        Platform::MacosArm64,
        &[
            r"darwin.*arm64",
            r"darwin.*aarch64",
            r"macos.*arm64",
            r"macos.*aarch64",
            r"apple.*arm64",
            r"apple.*aarch64",
            r"osx.*arm64",
            r"osx.*aarch64",
            r"mac.*arm64",
            r"mac.*aarch64",
        ],
    ),
    (
        Platform::MacosX86_64,
        &[
            r"darwin.*x86_64",
            r"darwin.*amd64",
            r"macos.*x86_64",
            r"macos.*amd64",
            r"apple.*x86_64",
            r"apple.*amd64",
            r"osx.*x86_64",
            r"osx.*amd64",
            r"mac.*x86_64",
            r"mac.*amd64",
            r"darwin64",
        ],
    ),
    (
        Platform::LinuxArm64,
        &[r"linux.*arm64", r"linux.*aarch64"],
    ),
    (
        Platform::LinuxX86_64,
        &[r"linux.*x86_64", r"linux.*amd64", r"linux64"],
    ),
];

fn platform_regexes() -> &'static [(Platform, Vec<Regex>)] {
    static COMPILED: OnceLock<Vec<(Platform, Vec<Regex>)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PLATFORM_PATTERNS
            .iter()
            .map(|(platform, patterns)| {
                let regexes = patterns
                    .iter()
                    .filter_map(|pattern| Regex::new(pattern).ok())
                    .collect();
                (*platform, regexes)
            })
            .collect()
    })
}

/// Guess the platform an asset was built for from its file name.
///
/// Only archives are considered; checksums, signatures and bare binaries
/// never match.
pub fn detect_platform(asset_name: &str) -> Option<Platform> {
    let name = asset_name.to_lowercase();
    if !ARCHIVE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        return None;
    }
    platform_regexes()
        .iter()
        .find(|(_, regexes)| regexes.iter().any(|re| re.is_match(&name)))
        .map(|(platform, _)| *platform)
}

fn matches_pattern(asset_name: &str, pattern: &str) -> bool {
    asset_name
        .to_lowercase()
        .contains(&pattern.trim().to_lowercase())
}

/// Pick one asset per platform slot.
///
/// A configured pattern for a slot takes precedence over auto-detection.
/// Fails when any required slot stays empty; optional slots that resolve are
/// kept.
pub fn resolve_assets<'a>(
    release: &'a Release,
    project: &ProjectConfig,
) -> Result<BTreeMap<Platform, &'a ReleaseAsset>, AssetResolutionError> {
    let mut resolved = BTreeMap::new();
    for platform in Platform::ALL {
        let found = match project.asset_patterns.get(&platform) {
            Some(pattern) => release
                .assets
                .iter()
                .find(|asset| matches_pattern(&asset.name, pattern)),
            None => release
                .assets
                .iter()
                .find(|asset| detect_platform(&asset.name) == Some(platform)),
        };
        if let Some(asset) = found {
            debug!(
                "synth: {} {} -> {}",
                release.version, platform, asset.name
            );
            resolved.insert(platform, asset);
        }
    }

    let missing: Vec<Platform> = project
        .required_platforms()
        .into_iter()
        .filter(|platform| !resolved.contains_key(platform))
        .collect();
    if !missing.is_empty() {
        return Err(AssetResolutionError {
            version: release.version,
            missing,
        });
    }
    Ok(resolved)
}

/// Merge configured overrides with repository metadata and built-in defaults.
pub fn resolve_metadata(project: &ProjectConfig, repo: Option<&RepoInfo>) -> FormulaMetadata {
    let name = project.display_name().to_string();
    let detected_description = repo.and_then(|r| non_empty(r.description.as_deref()));
    let detected_license = repo
        .and_then(|r| non_empty(r.license.as_deref()))
        .filter(|license| *license != "NOASSERTION");

    let description = non_empty(project.description.as_deref())
        .or(detected_description)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("{name} CLI tool"));
    let license = non_empty(project.license.as_deref())
        .or(detected_license)
        .unwrap_or(DEFAULT_LICENSE)
        .to_string();
    let homepage = non_empty(project.homepage.as_deref())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("https://github.com/{}", project.repo.trim()));

    FormulaMetadata {
        binary_name: project.formula_name().to_string(),
        name,
        description,
        license,
        homepage,
    }
}

/// Whether repository metadata is needed to fill in the formula header.
pub fn needs_repo_info(project: &ProjectConfig) -> bool {
    non_empty(project.description.as_deref()).is_none()
        || non_empty(project.license.as_deref()).is_none()
}

/// Assemble the record for one formula from already-checksummed assets.
pub fn synthesize(
    key: ManifestKey,
    release: &Release,
    assets: BTreeMap<Platform, ResolvedAsset>,
    metadata: &FormulaMetadata,
) -> ManifestRecord {
    ManifestRecord {
        key,
        tag: release.tag.clone(),
        version: release.version,
        assets,
        metadata: metadata.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::models::SemVer;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            url: format!("https://example.com/v1.2.3/{name}"),
            size: 10,
        }
    }

    fn release(names: &[&str]) -> Release {
        Release {
            tag: "v1.2.3".into(),
            version: SemVer::new(1, 2, 3),
            assets: names.iter().map(|n| asset(n)).collect(),
        }
    }

    fn full_release() -> Release {
        release(&[
            "tool-1.2.3-darwin-arm64.tar.gz",
            "tool-1.2.3-darwin-arm64.tar.gz.sha256",
            "tool-1.2.3-darwin-amd64.tar.gz",
            "tool-1.2.3-linux-aarch64.tar.gz",
            "tool-1.2.3-linux-x86_64.tar.gz",
            "tool-1.2.3-windows-x86_64.zip",
        ])
    }

    #[test]
    fn detects_platforms_from_asset_names() {
        assert_eq!(detect_platform("tool-Darwin-ARM64.tar.gz"), Some(Platform::MacosArm64));
        assert_eq!(detect_platform("tool-macos-x86_64.zip"), Some(Platform::MacosX86_64));
        assert_eq!(detect_platform("tool_darwin64.tgz"), Some(Platform::MacosX86_64));
        assert_eq!(detect_platform("tool-linux-arm64.tar.xz"), Some(Platform::LinuxArm64));
        assert_eq!(detect_platform("tool-linux64.tar.bz2"), Some(Platform::LinuxX86_64));
        assert_eq!(detect_platform("tool-linux-amd64"), None);
        assert_eq!(detect_platform("tool-linux-amd64.tar.gz.sha256"), None);
        assert_eq!(detect_platform("tool-windows-x86_64.zip"), None);
    }

    #[test]
    fn resolves_every_platform() {
        let release = full_release();
        let project = ProjectConfig::new("owner/tool");
        let resolved = resolve_assets(&release, &project).unwrap_or_default();
        assert_eq!(resolved.len(), 4);
        assert_eq!(
            resolved[&Platform::MacosX86_64].name,
            "tool-1.2.3-darwin-amd64.tar.gz"
        );
        assert_eq!(
            resolved[&Platform::LinuxArm64].name,
            "tool-1.2.3-linux-aarch64.tar.gz"
        );
    }

    #[test]
    fn configured_patterns_override_detection() {
        let release = release(&[
            "tool-apple-silicon.pkg",
            "tool-darwin-arm64.tar.gz",
            "tool-darwin-amd64.tar.gz",
            "tool-linux-arm64.tar.gz",
            "tool-linux-amd64.tar.gz",
        ]);
        let mut project = ProjectConfig::new("owner/tool");
        project
            .asset_patterns
            .insert(Platform::MacosArm64, "Apple-Silicon".into());
        let resolved = resolve_assets(&release, &project).unwrap_or_default();
        assert_eq!(resolved[&Platform::MacosArm64].name, "tool-apple-silicon.pkg");
        assert_eq!(resolved[&Platform::LinuxX86_64].name, "tool-linux-amd64.tar.gz");
    }

    #[test]
    fn missing_required_platform_is_reported() {
        let release = release(&["tool-darwin-arm64.tar.gz", "tool-linux-amd64.tar.gz"]);
        let project = ProjectConfig::new("owner/tool");
        let err = resolve_assets(&release, &project).err();
        assert_eq!(
            err,
            Some(AssetResolutionError {
                version: SemVer::new(1, 2, 3),
                missing: vec![Platform::MacosX86_64, Platform::LinuxArm64],
            })
        );
    }

    #[test]
    fn optional_platforms_may_be_absent() {
        let release = release(&["tool-darwin-arm64.tar.gz", "tool-linux-amd64.tar.gz"]);
        let mut project = ProjectConfig::new("owner/tool");
        project.platforms = Some(vec![Platform::MacosArm64]);
        let resolved = resolve_assets(&release, &project).unwrap_or_default();
        assert_eq!(
            resolved.keys().copied().collect::<Vec<_>>(),
            vec![Platform::MacosArm64, Platform::LinuxX86_64]
        );
    }

    #[test]
    fn metadata_prefers_overrides_then_repo_then_defaults() {
        let mut project = ProjectConfig::new("owner/tool");
        let repo = RepoInfo {
            description: Some("From GitHub".into()),
            license: Some("Apache-2.0".into()),
        };

        let meta = resolve_metadata(&project, Some(&repo));
        assert_eq!(meta.description, "From GitHub");
        assert_eq!(meta.license, "Apache-2.0");
        assert_eq!(meta.homepage, "https://github.com/owner/tool");
        assert_eq!(meta.binary_name, "tool");

        project.description = Some("Configured".into());
        project.homepage = Some("https://tool.dev".into());
        let meta = resolve_metadata(&project, Some(&repo));
        assert_eq!(meta.description, "Configured");
        assert_eq!(meta.homepage, "https://tool.dev");

        let meta = resolve_metadata(&ProjectConfig::new("owner/tool"), None);
        assert_eq!(meta.description, "tool CLI tool");
        assert_eq!(meta.license, "MIT");
    }

    #[test]
    fn unknown_repo_license_falls_back_to_default() {
        let repo = RepoInfo {
            description: None,
            license: Some("NOASSERTION".into()),
        };
        let meta = resolve_metadata(&ProjectConfig::new("owner/tool"), Some(&repo));
        assert_eq!(meta.license, "MIT");
    }

    #[test]
    fn repo_info_only_needed_without_overrides() {
        let mut project = ProjectConfig::new("owner/tool");
        assert!(needs_repo_info(&project));
        project.description = Some("d".into());
        assert!(needs_repo_info(&project));
        project.license = Some("MIT".into());
        assert!(!needs_repo_info(&project));
    }
}
