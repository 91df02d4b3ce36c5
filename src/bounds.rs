//! Content bounding-box estimation and fit-to-content for SVG documents.
//!
//! The bounding box is computed from a textual scan of the drawing elements.
//! Only `translate(...)` transforms contribute offsets; rotations and scales
//! are rare in plotter output and are treated as zero offset, which keeps the
//! estimate conservative enough for viewport fitting.

use crate::error::{Result, ResultExt};
use crate::merge::write_atomic;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use std::fs;
use std::path::Path;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"</?[A-Za-z][^>]*>").unwrap();
    static ref ATTR_RE: Regex = Regex::new(r#"([A-Za-z][A-Za-z0-9:-]*)\s*=\s*"([^"]*)""#).unwrap();
    static ref TRANSLATE_RE: Regex =
        Regex::new(r"translate\(\s*(-?[\d.]+)(?:\s*,\s*(-?[\d.]+))?\s*\)").unwrap();
    static ref NUMBER_RE: Regex = Regex::new(r"-?[\d.]+").unwrap();
    static ref UNIT_RE: Regex = Regex::new(r"(px|mm|cm|pt|pc|in|em|ex|%)").unwrap();
    static ref SVG_TAG_RE: Regex = Regex::new(r"<svg\b[^>]*>").unwrap();
    static ref WIDTH_UPSERT_RE: Regex = Regex::new(r#"(\s)width="[^"]*""#).unwrap();
    static ref HEIGHT_UPSERT_RE: Regex = Regex::new(r#"(\s)height="[^"]*""#).unwrap();
    static ref VIEWBOX_UPSERT_RE: Regex = Regex::new(r#"(\s)viewBox="[^"]*""#).unwrap();
}

/// Axis-aligned bounding box in SVG user units, margin included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Parses an SVG numeric value, stripping unit suffixes. Unparseable or
/// empty values yield 0.0.
pub(crate) fn parse_svg_number(value: &str) -> f64 {
    let stripped = UNIT_RE.replace_all(value.trim(), "");
    stripped.trim().parse().unwrap_or(0.0)
}

/// Extracts the translation offset from a transform attribute. Anything
/// other than `translate(...)` contributes no offset.
fn parse_translate(transform: &str) -> (f64, f64) {
    match TRANSLATE_RE.captures(transform) {
        Some(caps) => {
            let tx = caps[1].parse().unwrap_or(0.0);
            let ty = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0.0);
            (tx, ty)
        }
        None => (0.0, 0.0),
    }
}

/// Untranslated bounds of a single drawing element as
/// (min_x, max_x, min_y, max_y). Elements that do not draw return `None`.
fn element_bounds(name: &str, attrs: &[(&str, &str)]) -> Option<(f64, f64, f64, f64)> {
    let get = |key: &str| attrs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);
    let num = |key: &str| parse_svg_number(get(key).unwrap_or("0"));

    match name {
        "rect" => {
            let x = num("x");
            let y = num("y");
            Some((x, x + num("width"), y, y + num("height")))
        }
        "circle" => {
            let cx = num("cx");
            let cy = num("cy");
            let r = num("r");
            Some((cx - r, cx + r, cy - r, cy + r))
        }
        "ellipse" => {
            let cx = num("cx");
            let cy = num("cy");
            let rx = num("rx");
            let ry = num("ry");
            Some((cx - rx, cx + rx, cy - ry, cy + ry))
        }
        "line" => {
            let x1 = num("x1");
            let y1 = num("y1");
            let x2 = num("x2");
            let y2 = num("y2");
            Some((x1.min(x2), x1.max(x2), y1.min(y2), y1.max(y2)))
        }
        "path" => {
            let d = get("d")?;
            if d.is_empty() {
                return None;
            }
            let mut coords = Vec::new();
            for m in NUMBER_RE.find_iter(d) {
                coords.push(m.as_str().parse::<f64>().ok()?);
            }
            if coords.len() < 2 {
                return None;
            }
            // Path data alternates x and y; commands between the numbers are
            // ignored, which overestimates for arcs but never underestimates.
            let mut min_x = f64::INFINITY;
            let mut max_x = f64::NEG_INFINITY;
            let mut min_y = f64::INFINITY;
            let mut max_y = f64::NEG_INFINITY;
            for (i, value) in coords.iter().enumerate() {
                if i % 2 == 0 {
                    min_x = min_x.min(*value);
                    max_x = max_x.max(*value);
                } else {
                    min_y = min_y.min(*value);
                    max_y = max_y.max(*value);
                }
            }
            Some((min_x, max_x, min_y, max_y))
        }
        // Text extent is unknown without font metrics; use a nominal box.
        "text" | "tspan" => {
            let x = num("x");
            let y = num("y");
            Some((x, x + 10.0, y - 5.0, y + 5.0))
        }
        _ => None,
    }
}

/// Computes the bounding box of all drawable content, expanded by `margin`
/// on every side. Returns `None` when the document draws nothing.
pub fn calculate_svg_bounding_box(svg_content: &str, margin: f64) -> Option<BoundingBox> {
    let mut offset_stack: Vec<(f64, f64)> = vec![(0.0, 0.0)];
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut found_any = false;

    for m in TAG_RE.find_iter(svg_content) {
        let tag = m.as_str();
        if tag.starts_with("</") {
            if offset_stack.len() > 1 {
                offset_stack.pop();
            }
            continue;
        }

        let inner = tag.trim_start_matches('<').trim_end_matches('>');
        let self_closing = inner.ends_with('/');
        let inner = inner.trim_end_matches('/');
        let (name, attr_text) = match inner.find(char::is_whitespace) {
            Some(pos) => (&inner[..pos], &inner[pos..]),
            None => (inner, ""),
        };

        let mut attrs: Vec<(&str, &str)> = Vec::new();
        for caps in ATTR_RE.captures_iter(attr_text) {
            if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
                attrs.push((key.as_str(), value.as_str()));
            }
        }

        let (parent_tx, parent_ty) = offset_stack.last().copied().unwrap_or((0.0, 0.0));
        let (own_tx, own_ty) = attrs
            .iter()
            .find(|(k, _)| *k == "transform")
            .map(|(_, v)| parse_translate(v))
            .unwrap_or((0.0, 0.0));
        let tx = parent_tx + own_tx;
        let ty = parent_ty + own_ty;

        // An element's transform applies to its own geometry as well as to
        // its children.
        if let Some((e_min_x, e_max_x, e_min_y, e_max_y)) = element_bounds(name, &attrs) {
            min_x = min_x.min(e_min_x + tx);
            max_x = max_x.max(e_max_x + tx);
            min_y = min_y.min(e_min_y + ty);
            max_y = max_y.max(e_max_y + ty);
            found_any = true;
        }

        if !self_closing {
            offset_stack.push((tx, ty));
        }
    }

    if !found_any {
        debug!("No drawable content found in SVG");
        return None;
    }

    Some(BoundingBox {
        min_x: min_x - margin,
        max_x: max_x + margin,
        min_y: min_y - margin,
        max_y: max_y + margin,
    })
}

/// Shrinks the viewport of `svg_file` to its own drawable content plus
/// `margin` millimeters. Documents without drawable content are left as
/// they are.
pub fn fit_svg_to_content(svg_file: &Path, margin: f64) -> Result<()> {
    let content = fs::read_to_string(svg_file).with_path_context("read", svg_file)?;
    match calculate_svg_bounding_box(&content, margin) {
        Some(bounds) => apply_bounds(svg_file, &content, bounds),
        None => {
            warn!(
                "No drawable content found in {}, skipping fit-to-content",
                svg_file.display()
            );
            Ok(())
        }
    }
}

/// Shrinks the viewport of `svg_file` to the drawable content of
/// `reference_svg` plus `margin` millimeters. Used to crop a full document
/// to the board outline only.
pub fn fit_svg_to_reference(svg_file: &Path, reference_svg: &Path, margin: f64) -> Result<()> {
    let reference = fs::read_to_string(reference_svg).with_path_context("read", reference_svg)?;
    match calculate_svg_bounding_box(&reference, margin) {
        Some(bounds) => {
            let content = fs::read_to_string(svg_file).with_path_context("read", svg_file)?;
            apply_bounds(svg_file, &content, bounds)
        }
        None => {
            warn!(
                "No drawable content found in {}, skipping fit-to-content",
                reference_svg.display()
            );
            Ok(())
        }
    }
}

fn apply_bounds(svg_file: &Path, content: &str, bounds: BoundingBox) -> Result<()> {
    // A floor on the viewport size keeps nearly-empty content visible.
    const MIN_SIZE: f64 = 5.0;

    let mut min_x = bounds.min_x;
    let mut min_y = bounds.min_y;
    let mut width = bounds.width();
    let mut height = bounds.height();
    if width < MIN_SIZE {
        let center_x = (bounds.min_x + bounds.max_x) / 2.0;
        min_x = center_x - MIN_SIZE / 2.0;
        width = MIN_SIZE;
    }
    if height < MIN_SIZE {
        let center_y = (bounds.min_y + bounds.max_y) / 2.0;
        min_y = center_y - MIN_SIZE / 2.0;
        height = MIN_SIZE;
    }

    let viewbox = format!("{} {} {} {}", min_x, min_y, width, height);
    let updated = set_svg_tag_attrs(
        content,
        &format!("{}mm", width),
        &format!("{}mm", height),
        &viewbox,
    );
    write_atomic(svg_file, &updated)?;
    info!(
        "Fitted SVG to content: {} -> {:.3}x{:.3}mm",
        svg_file.display(),
        width,
        height
    );
    Ok(())
}

/// Rewrites width, height and viewBox on the root `<svg>` tag, adding any
/// attribute the tag does not already carry.
fn set_svg_tag_attrs(content: &str, width: &str, height: &str, viewbox: &str) -> String {
    let m = match SVG_TAG_RE.find(content) {
        Some(m) => m,
        None => return content.to_string(),
    };

    let mut tag = m.as_str().to_string();
    for (re, name, value) in [
        (&*WIDTH_UPSERT_RE, "width", width),
        (&*HEIGHT_UPSERT_RE, "height", height),
        (&*VIEWBOX_UPSERT_RE, "viewBox", viewbox),
    ] {
        if re.is_match(&tag) {
            tag = re
                .replace(&tag, format!(r#"${{1}}{}="{}""#, name, value).as_str())
                .into_owned();
        } else {
            let insert_at = if tag.ends_with("/>") {
                tag.len() - 2
            } else {
                tag.len() - 1
            };
            tag.insert_str(insert_at, &format!(r#" {}="{}""#, name, value));
        }
    }

    format!("{}{}{}", &content[..m.start()], tag, &content[m.end()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bbox(content: &str, margin: f64) -> Option<BoundingBox> {
        calculate_svg_bounding_box(content, margin)
    }

    #[test]
    fn test_parse_svg_number() {
        assert_eq!(parse_svg_number("100"), 100.0);
        assert_eq!(parse_svg_number("10.5mm"), 10.5);
        assert_eq!(parse_svg_number(" 50% "), 50.0);
        assert_eq!(parse_svg_number("29.000200mm"), 29.0002);
        assert_eq!(parse_svg_number(""), 0.0);
        assert_eq!(parse_svg_number("abc"), 0.0);
    }

    #[test]
    fn test_parse_translate() {
        assert_eq!(parse_translate("translate(10.5, 20)"), (10.5, 20.0));
        assert_eq!(parse_translate("translate(4)"), (4.0, 0.0));
        assert_eq!(parse_translate("translate(-3,-4.5)"), (-3.0, -4.5));
        assert_eq!(parse_translate("rotate(45)"), (0.0, 0.0));
        assert_eq!(parse_translate(""), (0.0, 0.0));
    }

    #[test]
    fn test_rect_bounds_with_margin() {
        let svg = r#"<svg><rect x="10" y="20" width="30" height="5"/></svg>"#;
        let bounds = bbox(svg, 1.0).unwrap();
        assert_eq!(bounds.min_x, 9.0);
        assert_eq!(bounds.max_x, 41.0);
        assert_eq!(bounds.min_y, 19.0);
        assert_eq!(bounds.max_y, 26.0);
        assert_eq!(bounds.width(), 32.0);
        assert_eq!(bounds.height(), 7.0);
    }

    #[test]
    fn test_circle_and_ellipse_bounds() {
        let svg = r#"<svg><circle cx="10" cy="10" r="3"/></svg>"#;
        let bounds = bbox(svg, 0.0).unwrap();
        assert_eq!((bounds.min_x, bounds.max_x), (7.0, 13.0));
        assert_eq!((bounds.min_y, bounds.max_y), (7.0, 13.0));

        let svg = r#"<svg><ellipse cx="10" cy="20" rx="4" ry="2"/></svg>"#;
        let bounds = bbox(svg, 0.0).unwrap();
        assert_eq!((bounds.min_x, bounds.max_x), (6.0, 14.0));
        assert_eq!((bounds.min_y, bounds.max_y), (18.0, 22.0));
    }

    #[test]
    fn test_line_bounds_handle_reversed_endpoints() {
        let svg = r#"<svg><line x1="30" y1="5" x2="10" y2="25"/></svg>"#;
        let bounds = bbox(svg, 0.0).unwrap();
        assert_eq!((bounds.min_x, bounds.max_x), (10.0, 30.0));
        assert_eq!((bounds.min_y, bounds.max_y), (5.0, 25.0));
    }

    #[test]
    fn test_path_bounds_from_coordinates() {
        let svg = r#"<svg><path d="M 161.9 78.9 L 191.0 94.0 L 170.0 80.0"/></svg>"#;
        let bounds = bbox(svg, 0.0).unwrap();
        assert_eq!((bounds.min_x, bounds.max_x), (161.9, 191.0));
        assert_eq!((bounds.min_y, bounds.max_y), (78.9, 94.0));
    }

    #[test]
    fn test_path_without_coordinates_is_ignored() {
        assert!(bbox(r#"<svg><path d=""/></svg>"#, 0.0).is_none());
        assert!(bbox(r#"<svg><path d="M 5"/></svg>"#, 0.0).is_none());
    }

    #[test]
    fn test_text_uses_nominal_box() {
        let svg = r#"<svg><text x="100" y="50">REF</text></svg>"#;
        let bounds = bbox(svg, 0.0).unwrap();
        assert_eq!((bounds.min_x, bounds.max_x), (100.0, 110.0));
        assert_eq!((bounds.min_y, bounds.max_y), (45.0, 55.0));
    }

    #[test]
    fn test_translate_offsets_accumulate() {
        let svg = r#"<svg>
<g transform="translate(100, 200)">
<g transform="translate(10, 20)">
<rect x="0" y="0" width="5" height="5"/>
</g>
</g>
</svg>"#;
        let bounds = bbox(svg, 0.0).unwrap();
        assert_eq!((bounds.min_x, bounds.max_x), (110.0, 115.0));
        assert_eq!((bounds.min_y, bounds.max_y), (220.0, 225.0));
    }

    #[test]
    fn test_sibling_groups_do_not_share_transforms() {
        let svg = r#"<svg>
<g transform="translate(100, 0)"><rect x="0" y="0" width="1" height="1"/></g>
<g><rect x="0" y="0" width="1" height="1"/></g>
</svg>"#;
        let bounds = bbox(svg, 0.0).unwrap();
        assert_eq!(bounds.min_x, 0.0);
        assert_eq!(bounds.max_x, 101.0);
    }

    #[test]
    fn test_transform_applies_to_element_itself() {
        let svg = r#"<svg><rect transform="translate(5, 7)" x="0" y="0" width="2" height="2"/></svg>"#;
        let bounds = bbox(svg, 0.0).unwrap();
        assert_eq!((bounds.min_x, bounds.max_x), (5.0, 7.0));
        assert_eq!((bounds.min_y, bounds.max_y), (7.0, 9.0));
    }

    #[test]
    fn test_empty_document_has_no_bounds() {
        assert!(bbox("<svg><g></g></svg>", 1.0).is_none());
        assert!(bbox("", 1.0).is_none());
    }

    #[test]
    fn test_fit_svg_to_content_rewrites_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.svg");
        fs::write(
            &path,
            r#"<svg width="297mm" height="210mm" viewBox="0 0 297 210">
<rect x="10" y="20" width="30" height="5"/>
</svg>"#,
        )
        .unwrap();

        fit_svg_to_content(&path, 1.0).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#"width="32mm""#), "got: {}", content);
        assert!(content.contains(r#"height="7mm""#), "got: {}", content);
        assert!(content.contains(r#"viewBox="9 19 32 7""#), "got: {}", content);
        assert!(content.contains("<rect"));
    }

    #[test]
    fn test_fit_enforces_minimum_viewport() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.svg");
        fs::write(
            &path,
            r#"<svg width="297mm" height="210mm" viewBox="0 0 297 210">
<rect x="10" y="10" width="1" height="1"/>
</svg>"#,
        )
        .unwrap();

        fit_svg_to_content(&path, 0.0).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#"width="5mm""#), "got: {}", content);
        assert!(content.contains(r#"height="5mm""#), "got: {}", content);
        assert!(content.contains(r#"viewBox="8 8 5 5""#), "got: {}", content);
    }

    #[test]
    fn test_fit_without_content_leaves_file_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.svg");
        let original = r#"<svg width="297mm" height="210mm" viewBox="0 0 297 210"><g></g></svg>"#;
        fs::write(&path, original).unwrap();

        fit_svg_to_content(&path, 1.0).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_fit_svg_to_reference_uses_reference_bounds() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target.svg");
        let reference = dir.path().join("edges.svg");
        fs::write(
            &target,
            r#"<svg width="297mm" height="210mm" viewBox="0 0 297 210">
<circle cx="500" cy="500" r="10"/>
</svg>"#,
        )
        .unwrap();
        fs::write(
            &reference,
            r#"<svg width="297mm" height="210mm" viewBox="0 0 297 210">
<rect x="100" y="100" width="50" height="40"/>
</svg>"#,
        )
        .unwrap();

        fit_svg_to_reference(&target, &reference, 0.0).unwrap();
        let content = fs::read_to_string(&target).unwrap();
        assert!(content.contains(r#"viewBox="100 100 50 40""#), "got: {}", content);
        assert!(content.contains(r#"width="50mm""#));
        assert!(content.contains("<circle"), "content must not be clipped away");
    }

    #[test]
    fn test_set_svg_tag_attrs_adds_missing_viewbox() {
        let content = r#"<svg width="10mm" height="10mm"><rect x="0" y="0" width="2" height="2"/></svg>"#;
        let updated = set_svg_tag_attrs(content, "4mm", "4mm", "0 0 4 4");
        assert!(updated.contains(r#"width="4mm""#));
        assert!(updated.contains(r#"viewBox="0 0 4 4""#));
        assert!(updated.contains("<rect"));
        assert_eq!(updated.matches("viewBox").count(), 1);
    }
}
