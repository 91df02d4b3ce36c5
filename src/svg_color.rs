//! SVG copper color detection and replacement
//!
//! All transforms here operate on the raw SVG text instead of a DOM. The
//! exporter's formatting survives byte for byte, which keeps the dimension
//! strings that the merge step compares for equality intact.

use crate::color::{hex_channels, parse_color, validate_hex_color, NON_COPPER_COLORS};
use crate::css::{net_layer_css_class, net_name_to_css_class};
use crate::error::{Result, ResultExt, SvgExtrasError};
use anyhow::Context;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::fs;
use std::path::Path;
use tracing::warn;

lazy_static! {
    static ref ELEMENT_TAG_RE: Regex = Regex::new(r"<[A-Za-z][^>]*>").unwrap();
    static ref FILL_ATTR_RE: Regex = Regex::new(r#"fill="([^"]*)""#).unwrap();
    static ref STYLE_ATTR_RE: Regex = Regex::new(r#"style="([^"]*)""#).unwrap();
    static ref STYLE_FILL_RE: Regex = Regex::new(r"fill:\s*#([0-9A-Fa-f]{6})").unwrap();
    static ref FILL_DECL_RE: Regex = Regex::new(r"fill:\s*[^;]+;?").unwrap();
    static ref STROKE_DECL_RE: Regex = Regex::new(r"stroke:\s*[^;]+;?").unwrap();
    static ref DOUBLE_SEMI_RE: Regex = Regex::new(r";\s*;").unwrap();
}

/// Detect the copper color drawn in an exported layer SVG.
///
/// Scans elements in document order, checking the `fill` attribute and then
/// `fill:` declarations inside the `style` attribute. The first 6-digit hex
/// color that is not pure black or white wins; those two are background and
/// drill artifacts, never drawn copper.
pub fn find_copper_color(content: &str) -> Option<String> {
    for tag in ELEMENT_TAG_RE.find_iter(content) {
        let tag_text = tag.as_str();

        if let Some(caps) = FILL_ATTR_RE.captures(tag_text) {
            let fill = &caps[1];
            if validate_hex_color(fill) {
                let color = fill.to_uppercase();
                if !NON_COPPER_COLORS.contains(&color.as_str()) {
                    return Some(color);
                }
            }
        }

        if let Some(style) = STYLE_ATTR_RE.captures(tag_text) {
            if let Some(caps) = STYLE_FILL_RE.captures(&style[1]) {
                let color = format!("#{}", &caps[1]).to_uppercase();
                if !NON_COPPER_COLORS.contains(&color.as_str()) {
                    return Some(color);
                }
            }
        }
    }

    None
}

/// Replace one hex color with another throughout the SVG text.
///
/// Substitutes the lowercase hex, uppercase hex, and `rgb(r,g,b)` spellings.
/// Both colors must be valid `#RRGGBB` values.
pub fn change_svg_color(content: &str, old_color: &str, new_color: &str) -> Result<String> {
    let (old_r, old_g, old_b) =
        hex_channels(old_color).ok_or_else(|| SvgExtrasError::InvalidOldColor {
            value: old_color.to_string(),
        })?;
    let (new_r, new_g, new_b) =
        hex_channels(new_color).ok_or_else(|| SvgExtrasError::InvalidNewColor {
            value: new_color.to_string(),
        })?;

    let old_rgb = format!("rgb({},{},{})", old_r, old_g, old_b);
    let new_rgb = format!("rgb({},{},{})", new_r, new_g, new_b);

    let content = content.replace(&old_color.to_lowercase(), &new_color.to_lowercase());
    let content = content.replace(&old_color.to_uppercase(), &new_color.to_uppercase());
    let content = content.replace(&old_rgb, &new_rgb);

    Ok(content)
}

/// Recolor an exported net SVG file with the resolved net color.
///
/// When no copper color can be detected the file is copied through
/// unchanged; a substitution would have nothing real to replace.
pub fn apply_color_to_svg(svg_file: &Path, output_file: &Path, net_color: &str) -> Result<()> {
    let hex_color = parse_color(net_color).context("Invalid net color")?;

    let content = fs::read_to_string(svg_file).with_path_context("read SVG", svg_file)?;

    let current_color = match find_copper_color(&content) {
        Some(color) => color,
        None => {
            warn!(
                "Could not detect copper color in {}, skipping recoloring",
                svg_file.display()
            );
            fs::copy(svg_file, output_file).with_path_context("copy SVG", svg_file)?;
            return Ok(());
        }
    };

    let recolored = change_svg_color(&content, &current_color, &hex_color)?;
    fs::write(output_file, recolored).with_path_context("write SVG", output_file)?;
    Ok(())
}

/// Replace the copper color in a net SVG with a CSS class.
///
/// Elements whose `style` attribute carries the detected fill or stroke
/// color lose those declarations and gain the generated class instead, and
/// one `<style>` rule mapping the class to the fallback color is inserted
/// after the `</desc>` tag. An element that already received the class
/// during the fill pass is not given a second `class` attribute by the
/// stroke pass.
pub fn apply_css_class_to_svg(
    svg_file: &Path,
    output_file: &Path,
    net_name: &str,
    fallback_color: &str,
    layer_name: Option<&str>,
) -> Result<()> {
    let hex_color = parse_color(fallback_color).context("Invalid color")?;

    let css_class = match layer_name {
        Some(layer) => net_layer_css_class(net_name, layer),
        None => net_name_to_css_class(net_name),
    };

    let content = fs::read_to_string(svg_file).with_path_context("read SVG", svg_file)?;

    let current_color = match find_copper_color(&content) {
        Some(color) => color,
        None => {
            warn!(
                "Could not detect copper color in {}, skipping CSS processing",
                svg_file.display()
            );
            fs::copy(svg_file, output_file).with_path_context("copy SVG", svg_file)?;
            return Ok(());
        }
    };

    let old_hex = current_color.to_lowercase();
    let old_hex_upper = current_color.to_uppercase();
    let (r, g, b) = hex_channels(&current_color).ok_or_else(|| SvgExtrasError::InvalidOldColor {
        value: current_color.clone(),
    })?;
    let old_rgb = format!("rgb({},{},{})", r, g, b);

    // Remove fill declarations matching the copper color and add the class
    let fill_re = Regex::new(&format!(
        r#"(?i)style="([^"]*(?:fill:\s*(?:{}|{}|{}))[^"]*)""#,
        regex::escape(&old_hex),
        regex::escape(&old_hex_upper),
        regex::escape(&old_rgb)
    ))
    .context("Invalid fill style pattern")?;
    let content = fill_re
        .replace_all(&content, |caps: &Captures| {
            let cleaned = strip_style_declaration(&caps[1], &FILL_DECL_RE);
            format!(r#"style="{}" class="{}""#, cleaned, css_class)
        })
        .into_owned();

    // Same for stroke declarations, keeping any class added above
    let stroke_re = Regex::new(&format!(
        r#"(?i)style="([^"]*(?:stroke:\s*(?:{}|{}|{}))[^"]*)"(\s+class="[^"]*")?"#,
        regex::escape(&old_hex),
        regex::escape(&old_hex_upper),
        regex::escape(&old_rgb)
    ))
    .context("Invalid stroke style pattern")?;
    let mut content = stroke_re
        .replace_all(&content, |caps: &Captures| {
            let cleaned = strip_style_declaration(&caps[1], &STROKE_DECL_RE);
            match caps.get(2) {
                Some(existing) => format!(r#"style="{}"{}"#, cleaned, existing.as_str()),
                None => format!(r#"style="{}" class="{}""#, cleaned, css_class),
            }
        })
        .into_owned();

    // Add the class definition right after the <desc> tag
    let style_section = format!(
        "<style>\n.{} {{\n    fill: {};\n    stroke: {};\n}}\n</style>",
        css_class, hex_color, hex_color
    );
    if let Some(desc_end) = content.find("</desc>") {
        let insert_pos = desc_end + "</desc>".len();
        content.insert_str(insert_pos, &format!("\n{}", style_section));
    }

    fs::write(output_file, content).with_path_context("write SVG", output_file)?;
    Ok(())
}

/// Drop one property's declarations from a style attribute value and tidy
/// up leftover semicolons and whitespace
fn strip_style_declaration(style_content: &str, decl_re: &Regex) -> String {
    let without = decl_re.replace_all(style_content, "");
    let collapsed = DOUBLE_SEMI_RE.replace_all(&without, ";");
    collapsed.trim_matches(';').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_fill_attribute() {
        let svg = r##"<?xml version="1.0"?>
<svg xmlns="http://www.w3.org/2000/svg">
    <rect fill="#FF0000" width="10" height="10"/>
</svg>"##;
        assert_eq!(find_copper_color(svg), Some("#FF0000".to_string()));
    }

    #[test]
    fn test_find_style_fill() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
<g style="fill:#b28c00; stroke:#b28c00">
  <path d="M10,10 L20,20"/>
</g>
</svg>"##;
        assert_eq!(find_copper_color(svg), Some("#B28C00".to_string()));
    }

    #[test]
    fn test_find_skips_black_and_white() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
    <rect fill="#000000" width="10" height="10"/>
    <rect fill="#ffffff" width="10" height="10"/>
    <g style="fill:#FFFFFF"><path d="M0,0"/></g>
</svg>"##;
        assert_eq!(find_copper_color(svg), None);
    }

    #[test]
    fn test_find_first_color_in_document_order() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
    <rect fill="#000000"/>
    <rect fill="#C83434"/>
    <rect fill="#4D7FC4"/>
</svg>"##;
        assert_eq!(find_copper_color(svg), Some("#C83434".to_string()));
    }

    #[test]
    fn test_find_ignores_non_hex_fills() {
        let svg = r#"<svg><rect fill="none"/><rect fill="url(#grad)"/></svg>"#;
        assert_eq!(find_copper_color(svg), None);
    }

    #[test]
    fn test_change_svg_color_all_spellings() {
        let svg = r##"<g style="fill:#b28c00; stroke:#B28C00">
<rect fill="rgb(178,140,0)"/>
</g>"##;
        let result = change_svg_color(svg, "#B28C00", "#FF0000").unwrap();
        assert!(result.contains("fill:#ff0000"));
        assert!(result.contains("stroke:#FF0000"));
        assert!(result.contains(r#"fill="rgb(255,0,0)""#));
        assert!(!result.contains("b28c00"));
        assert!(!result.contains("B28C00"));
    }

    #[test]
    fn test_change_svg_color_rejects_invalid() {
        let err = change_svg_color("<svg/>", "notacolor", "#FF0000").unwrap_err();
        assert!(err.to_string().contains("Invalid old color format"));

        let err = change_svg_color("<svg/>", "#FF0000", "red").unwrap_err();
        assert!(err.to_string().contains("Invalid new color format"));
    }

    #[test]
    fn test_apply_color_to_svg() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.svg");
        let output = temp_dir.path().join("output.svg");

        std::fs::write(
            &input,
            r##"<svg xmlns="http://www.w3.org/2000/svg">
<g style="fill:#b28c00">
  <path d="M10,10 L20,20"/>
</g>
</svg>"##,
        )
        .unwrap();

        apply_color_to_svg(&input, &output, "green").unwrap();

        let result = std::fs::read_to_string(&output).unwrap();
        assert!(result.contains("fill:#008000"));
        assert!(!result.contains("#b28c00"));
    }

    #[test]
    fn test_apply_color_copies_when_no_copper_found() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.svg");
        let output = temp_dir.path().join("output.svg");

        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
<rect fill="#000000" width="5" height="5"/>
</svg>"##;
        std::fs::write(&input, svg).unwrap();

        apply_color_to_svg(&input, &output, "#FF0000").unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), svg);
    }

    #[test]
    fn test_apply_css_class_basic() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.svg");
        let output = temp_dir.path().join("output.svg");

        std::fs::write(
            &input,
            r##"<svg xmlns="http://www.w3.org/2000/svg">
<desc>Generated by KiCad</desc>
<g style="fill:#B28C00;stroke:#B28C00">
  <path d="M10,10 L20,20"/>
</g>
</svg>"##,
        )
        .unwrap();

        apply_css_class_to_svg(&input, &output, "VCC", "#FF0000", None).unwrap();

        let result = std::fs::read_to_string(&output).unwrap();
        assert!(result.contains(".net-vcc"));
        assert!(result.contains("fill: #FF0000;"));
        assert!(result.contains("stroke: #FF0000;"));
        assert!(result.contains(r#"class="net-vcc""#));
        assert!(!result.contains("fill:#B28C00"));
        assert!(!result.contains("stroke:#B28C00"));
    }

    #[test]
    fn test_apply_css_class_adds_single_class_attribute() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.svg");
        let output = temp_dir.path().join("output.svg");

        std::fs::write(
            &input,
            r##"<svg xmlns="http://www.w3.org/2000/svg">
<desc>d</desc>
<g style="fill:#B28C00;stroke:#B28C00"><path d="M0,0"/></g>
</svg>"##,
        )
        .unwrap();

        apply_css_class_to_svg(&input, &output, "VCC", "#FF0000", None).unwrap();

        let result = std::fs::read_to_string(&output).unwrap();
        assert_eq!(result.matches(r#"class="net-vcc""#).count(), 1);
    }

    #[test]
    fn test_apply_css_class_preserves_other_declarations() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.svg");
        let output = temp_dir.path().join("output.svg");

        std::fs::write(
            &input,
            r##"<svg xmlns="http://www.w3.org/2000/svg">
<desc>d</desc>
<g style="fill:#B28C00;stroke:#B28C00;stroke-width:0.1"><path d="M0,0"/></g>
</svg>"##,
        )
        .unwrap();

        apply_css_class_to_svg(&input, &output, "VCC", "#FF0000", None).unwrap();

        let result = std::fs::read_to_string(&output).unwrap();
        assert!(result.contains("stroke-width:0.1"));
        assert!(!result.contains("fill:#B28C00"));
        assert!(!result.contains("stroke:#B28C00"));
    }

    #[test]
    fn test_apply_css_class_layer_scoped() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.svg");
        let output = temp_dir.path().join("output.svg");

        std::fs::write(
            &input,
            r##"<svg xmlns="http://www.w3.org/2000/svg">
<desc>d</desc>
<g style="fill:#B28C00"><path d="M0,0"/></g>
</svg>"##,
        )
        .unwrap();

        apply_css_class_to_svg(&input, &output, "VCC", "#FF0000", Some("F.Cu")).unwrap();

        let result = std::fs::read_to_string(&output).unwrap();
        assert!(result.contains(r#"class="net-vcc-f-cu""#));
        assert!(result.contains(".net-vcc-f-cu"));
    }

    #[test]
    fn test_apply_css_class_copies_when_no_copper_found() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.svg");
        let output = temp_dir.path().join("output.svg");

        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
<desc>d</desc>
<rect fill="#FFFFFF"/>
</svg>"##;
        std::fs::write(&input, svg).unwrap();

        apply_css_class_to_svg(&input, &output, "VCC", "#FF0000", None).unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), svg);
    }

    #[test]
    fn test_apply_css_class_rejects_invalid_color() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.svg");
        let output = temp_dir.path().join("output.svg");
        std::fs::write(&input, "<svg/>").unwrap();

        let err =
            apply_css_class_to_svg(&input, &output, "VCC", "invalid_color", None).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid color"));
    }
}
