//! Compositing of per-net SVG fragments into a single output document.
//!
//! Fragments are combined textually rather than through an XML DOM so the
//! exporter's formatting survives untouched. Every fragment must agree on
//! width, height and viewBox before its content is merged, which keeps the
//! drawing groups of all fragments in a shared coordinate system.

use crate::color::DEFAULT_BACKGROUND_DARK;
use crate::error::{Result, ResultExt, SvgExtrasError};

use lazy_static::lazy_static;
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::debug;

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref SVG_TAG_RE: Regex = Regex::new(r"<svg\b[^>]*>").unwrap();
    static ref WIDTH_ATTR_RE: Regex = Regex::new(r#"\swidth="([^"]*)""#).unwrap();
    static ref HEIGHT_ATTR_RE: Regex = Regex::new(r#"\sheight="([^"]*)""#).unwrap();
    static ref VIEWBOX_ATTR_RE: Regex = Regex::new(r#"\sviewBox="([^"]*)""#).unwrap();
    static ref STYLE_BLOCK_RE: Regex = Regex::new(r"(?s)<style[^>]*>(.*?)</style>").unwrap();
    static ref CSS_RULE_RE: Regex = Regex::new(r"[^{}]+\{[^{}]*\}").unwrap();
    // Self-closing groups first: the paired branch would otherwise absorb
    // the `/` of `<g .../>` and swallow the closing tag of the parent
    static ref EMPTY_GROUP_RE: Regex = Regex::new(r"<g\b[^>]*/>|<g\b[^>]*>\s*</g>").unwrap();
}

/// Raw dimension attributes of an SVG root element. Values are kept as the
/// exact attribute strings so that validation is a plain string comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SvgDimensions {
    pub width: Option<String>,
    pub height: Option<String>,
    pub viewbox: Option<String>,
}

impl SvgDimensions {
    pub fn new(width: &str, height: &str, viewbox: &str) -> Self {
        Self {
            width: Some(width.to_string()),
            height: Some(height.to_string()),
            viewbox: Some(viewbox.to_string()),
        }
    }
}

/// Reads width, height and viewBox from the first `<svg ...>` tag.
pub fn extract_svg_dimensions(svg_content: &str) -> SvgDimensions {
    let tag = match SVG_TAG_RE.find(svg_content) {
        Some(m) => m.as_str(),
        None => return SvgDimensions::default(),
    };
    let attr = |re: &Regex| re.captures(tag).map(|caps| caps[1].to_string());
    SvgDimensions {
        width: attr(&WIDTH_ATTR_RE),
        height: attr(&HEIGHT_ATTR_RE),
        viewbox: attr(&VIEWBOX_ATTR_RE),
    }
}

fn dimension_str(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "none".to_string())
}

/// Returns the content of the first `<style>` block, or an empty string.
pub fn extract_css_styles(svg_content: &str) -> String {
    STYLE_BLOCK_RE
        .captures(svg_content)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default()
}

/// Concatenates CSS blocks, dropping textually identical rules. The first
/// occurrence of a rule wins so fragment order determines the result.
pub fn merge_css_styles(css_styles: &[String]) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut rules: Vec<String> = Vec::new();
    for css in css_styles {
        if css.trim().is_empty() {
            continue;
        }
        for m in CSS_RULE_RE.find_iter(css) {
            let rule = m.as_str().trim();
            if !rule.is_empty() && !seen.contains(rule) {
                seen.insert(rule.to_string());
                rules.push(rule.to_string());
            }
        }
    }
    rules.join("\n")
}

/// Merges SVG fragments into `output_file`.
///
/// All fragments (and `base_svg`, when it exists) must share identical
/// width/height/viewBox attribute strings. The reference values come from the
/// base SVG when given, otherwise from the first fragment that exists on
/// disk. `forced_dims` overrides the dimensions written to the output header
/// without relaxing the per-fragment validation.
pub fn merge_svg_files(
    svg_files: &[PathBuf],
    output_file: &Path,
    base_svg: Option<&Path>,
    forced_dims: Option<&SvgDimensions>,
) -> Result<()> {
    if svg_files.is_empty() {
        return Err(SvgExtrasError::NoFilesToMerge.into());
    }

    let mut reference: Option<SvgDimensions> = None;
    if let Some(base) = base_svg {
        if base.exists() {
            let content = fs::read_to_string(base).with_path_context("read", base)?;
            reference = Some(extract_svg_dimensions(&content));
        }
    }

    // Fragments that do not exist are skipped silently: callers pass the
    // full set of candidate files and some nets may have produced nothing.
    let mut fragments: Vec<(&Path, String)> = Vec::new();
    for svg_file in svg_files {
        if !svg_file.exists() {
            debug!("Skipping missing SVG fragment: {}", svg_file.display());
            continue;
        }
        let content = fs::read_to_string(svg_file).with_path_context("read", svg_file)?;
        let dims = extract_svg_dimensions(&content);
        match &reference {
            None => reference = Some(dims),
            Some(expected) => {
                if dims != *expected {
                    return Err(SvgExtrasError::DimensionMismatch {
                        file: svg_file.display().to_string(),
                        expected_width: dimension_str(&expected.width),
                        expected_height: dimension_str(&expected.height),
                        expected_viewbox: dimension_str(&expected.viewbox),
                        width: dimension_str(&dims.width),
                        height: dimension_str(&dims.height),
                        viewbox: dimension_str(&dims.viewbox),
                    }
                    .into());
                }
            }
        }
        fragments.push((svg_file.as_path(), content));
    }

    let reference = match reference {
        Some(dims) if dims.viewbox.is_some() => dims,
        _ => return Err(SvgExtrasError::NoValidSvgFiles.into()),
    };
    let header_dims = forced_dims.unwrap_or(&reference);

    let mut svg_content = format!(
        r#"<?xml version="1.0" standalone="no"?>
<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN"
"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd">
<svg
xmlns:svg="http://www.w3.org/2000/svg"
xmlns="http://www.w3.org/2000/svg"
xmlns:xlink="http://www.w3.org/1999/xlink"
version="1.1"
width="{}" height="{}" viewBox="{}">
<title>Merged SVG with per-net colors</title>
<desc>Generated by net_colored_svg tool</desc>
"#,
        dimension_str(&header_dims.width),
        dimension_str(&header_dims.height),
        dimension_str(&header_dims.viewbox),
    );

    let css_styles: Vec<String> = fragments
        .iter()
        .map(|(_, content)| extract_css_styles(content))
        .filter(|css| !css.is_empty())
        .collect();
    let merged_css = merge_css_styles(&css_styles);
    if !merged_css.is_empty() {
        svg_content.push_str(&format!("<style>\n{}\n</style>\n", merged_css));
    }

    let background_marker = format!(r#"fill="{}""#, DEFAULT_BACKGROUND_DARK);
    for (_, content) in &fragments {
        let (start, end) = match (content.find("<g"), content.rfind("</g>")) {
            (Some(start), Some(end)) if start <= end => (start, end + "</g>".len()),
            _ => continue,
        };
        let group_content = &content[start..end];
        // Theme backgrounds and style blocks inside the span would repeat
        // per fragment, so such spans are dropped wholesale.
        if group_content.contains(&background_marker) || group_content.contains("<style>") {
            continue;
        }
        svg_content.push_str(group_content);
        svg_content.push('\n');
    }

    svg_content.push_str("</svg>");
    write_atomic(output_file, &svg_content)
}

/// Inserts an opaque background rectangle right after the `</desc>` of the
/// document. Documents without a `<desc>` are left untouched. The rectangle
/// covers the viewBox when one is present, else the width/height extent.
pub fn add_background_to_svg(svg_file: &Path, background_color: &str) -> Result<()> {
    let content = fs::read_to_string(svg_file).with_path_context("read", svg_file)?;
    let desc_end = match content.find("</desc>") {
        Some(pos) => pos + "</desc>".len(),
        None => return Ok(()),
    };

    let dims = extract_svg_dimensions(&content);
    let (x, y, width, height) = background_geometry(&dims);
    let rect = format!(
        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
        x, y, width, height, background_color
    );

    let mut updated = content;
    updated.insert_str(desc_end, &format!("\n{}", rect));
    write_atomic(svg_file, &updated)
}

fn background_geometry(dims: &SvgDimensions) -> (f64, f64, f64, f64) {
    if let Some(viewbox) = &dims.viewbox {
        let parts: Vec<f64> = viewbox
            .split_whitespace()
            .filter_map(|part| part.parse().ok())
            .collect();
        if parts.len() == 4 {
            return (parts[0], parts[1], parts[2], parts[3]);
        }
    }
    let parse = |value: &Option<String>| -> f64 {
        let mut raw = value.clone().unwrap_or_default();
        for unit in ["cm", "mm", "px", "pt", "in"] {
            raw = raw.replace(unit, "");
        }
        let raw = raw.trim();
        if raw.is_empty() {
            100.0
        } else {
            raw.parse().unwrap_or(100.0)
        }
    };
    (0.0, 0.0, parse(&dims.width), parse(&dims.height))
}

/// Removes `<g>` elements with no content, repeating until none remain so
/// that groups which only contained empty groups disappear as well.
pub fn remove_empty_groups(svg_content: &str) -> String {
    let mut current = svg_content.to_string();
    loop {
        let next = EMPTY_GROUP_RE.replace_all(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// File-level wrapper around [`remove_empty_groups`].
pub fn remove_empty_groups_from_file(svg_file: &Path) -> Result<()> {
    let content = fs::read_to_string(svg_file).with_path_context("read", svg_file)?;
    let cleaned = remove_empty_groups(&content);
    if cleaned != content {
        write_atomic(svg_file, &cleaned)?;
    }
    Ok(())
}

/// Writes `content` to a sibling temporary file and renames it over `path`,
/// so a crash never leaves a truncated file at the final location.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).with_path_context("create temporary", path)?;
    tmp.write_all(content.as_bytes())
        .with_path_context("write", path)?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_path_context("rename temporary", path)?;
    Ok(())
}
