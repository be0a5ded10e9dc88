use std::fmt::Write;

use regex::Regex;

use crate::engine::models::{ManifestKey, ManifestRecord, Platform, ResolvedAsset};
use crate::selector::{normalize_version, tag_prefix};

const FORMULA_EXTENSION: &str = ".rb";

/// File name for a formula: `name.rb` for latest, `name@M.m.rb` for pins.
pub fn file_name(formula_name: &str, key: ManifestKey) -> String {
    match key {
        ManifestKey::Latest => format!("{formula_name}{FORMULA_EXTENSION}"),
        ManifestKey::Pinned { major, minor } => {
            format!("{formula_name}@{major}.{minor}{FORMULA_EXTENSION}")
        }
    }
}

/// Builds the matcher for files belonging to `formula_name`.
pub fn file_name_matcher(formula_name: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"^{}(?:@(\d+)\.(\d+))?\.rb$",
        regex::escape(formula_name)
    ))
}

/// Inverse of [`file_name`]; `None` for files that belong to something else.
pub fn parse_file_name(matcher: &Regex, file_name: &str) -> Option<ManifestKey> {
    let caps = matcher.captures(file_name)?;
    match (caps.get(1), caps.get(2)) {
        (Some(major), Some(minor)) => Some(ManifestKey::Pinned {
            major: major.as_str().parse().ok()?,
            minor: minor.as_str().parse().ok()?,
        }),
        _ => Some(ManifestKey::Latest),
    }
}

/// Ruby class name Homebrew expects for the formula.
pub fn class_name(formula_name: &str, key: ManifestKey) -> String {
    let mut name: String = formula_name
        .split(['-', '_'])
        .map(capitalize)
        .collect();
    if let ManifestKey::Pinned { major, minor } = key {
        let _ = write!(name, "AT{major}{minor}");
    }
    name
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Escape text for a double-quoted Ruby string literal.
fn ruby_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '#' if chars.peek() == Some(&'{') => out.push_str("\\#"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Swap the literal tag in a download URL for Ruby interpolation of `version`.
fn templated_url(url: &str, tag: &str) -> String {
    let escaped = ruby_str(url);
    if tag.is_empty() {
        return escaped;
    }
    let interpolated = format!("{}#{{version}}", ruby_str(tag_prefix(tag)));
    escaped.replace(&ruby_str(tag), &interpolated)
}

fn write_source(out: &mut String, indent: &str, asset: &ResolvedAsset, tag: &str) {
    let _ = writeln!(out, "{indent}url \"{}\"", templated_url(&asset.url, tag));
    let _ = writeln!(out, "{indent}sha256 \"{}\"", asset.sha256);
}

fn write_os_block(
    out: &mut String,
    block: &str,
    arm: Option<&ResolvedAsset>,
    intel: Option<&ResolvedAsset>,
    tag: &str,
) {
    if arm.is_none() && intel.is_none() {
        return;
    }
    let _ = writeln!(out, "  {block} do");
    match (arm, intel) {
        (Some(arm), Some(intel)) => {
            out.push_str("    if Hardware::CPU.arm?\n");
            write_source(out, "      ", arm, tag);
            out.push_str("    else\n");
            write_source(out, "      ", intel, tag);
            out.push_str("    end\n");
        }
        (Some(only), None) | (None, Some(only)) => write_source(out, "    ", only, tag),
        (None, None) => {}
    }
    out.push_str("  end\n\n");
}

/// Render the Ruby source of a formula.
///
/// Output depends only on the record, so re-rendering an unchanged record is
/// byte-for-byte identical.
pub fn render(record: &ManifestRecord) -> String {
    let meta = &record.metadata;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "class {} < Formula",
        class_name(meta.formula_name(), record.key)
    );
    let _ = writeln!(out, "  desc \"{}\"", ruby_str(&meta.description));
    let _ = writeln!(out, "  homepage \"{}\"", ruby_str(&meta.homepage));
    let _ = writeln!(out, "  license \"{}\"", ruby_str(&meta.license));
    // The URLs interpolate `version`, so it must spell the tag exactly.
    let _ = writeln!(
        out,
        "  version \"{}\"",
        ruby_str(normalize_version(&record.tag))
    );
    out.push('\n');

    write_os_block(
        &mut out,
        "on_macos",
        record.assets.get(&Platform::MacosArm64),
        record.assets.get(&Platform::MacosX86_64),
        &record.tag,
    );
    write_os_block(
        &mut out,
        "on_linux",
        record.assets.get(&Platform::LinuxArm64),
        record.assets.get(&Platform::LinuxX86_64),
        &record.tag,
    );

    let binary = ruby_str(&meta.binary_name);
    let _ = write!(
        out,
        "  def install\n    bin.install \"{binary}\"\n  end\n\n  test do\n    assert_match version.to_s, shell_output(\"#{{bin}}/{binary} --version\")\n  end\nend\n"
    );
    out
}
