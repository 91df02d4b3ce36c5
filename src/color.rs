//! Color parsing and net color resolution
//!
//! This module converts the color notations accepted on the command line and
//! in configuration files into canonical `#RRGGBB` form, and resolves net
//! names to colors through exact and wildcard pattern matching.

use crate::error::{Result, ResultExt, SvgExtrasError};
use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Background color used by kicad-cli dark themes
pub const DEFAULT_BACKGROUND_DARK: &str = "#282A36";

/// Default background color for generated output
pub const DEFAULT_BACKGROUND_LIGHT: &str = "#FFFFFF";

/// Colors excluded during drawn-color auto-detection
pub const NON_COPPER_COLORS: [&str; 2] = ["#000000", "#FFFFFF"];

lazy_static! {
    /// Named color palette (Web/CSS colors)
    static ref NAMED_COLORS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        // Basic colors
        m.insert("red", "#FF0000");
        m.insert("green", "#008000");
        m.insert("blue", "#0000FF");
        m.insert("yellow", "#FFFF00");
        m.insert("cyan", "#00FFFF");
        m.insert("magenta", "#FF00FF");
        m.insert("black", "#000000");
        m.insert("white", "#FFFFFF");
        m.insert("gray", "#808080");
        m.insert("grey", "#808080");
        m.insert("orange", "#FFA500");
        m.insert("purple", "#800080");
        m.insert("brown", "#A52A2A");
        // Extended palette
        m.insert("lime", "#00FF00");
        m.insert("navy", "#000080");
        m.insert("maroon", "#800000");
        m.insert("olive", "#808000");
        m.insert("aqua", "#00FFFF");
        m.insert("fuchsia", "#FF00FF");
        m.insert("silver", "#C0C0C0");
        m.insert("teal", "#008080");
        m.insert("pink", "#FFC0CB");
        m.insert("gold", "#FFD700");
        m.insert("indigo", "#4B0082");
        m.insert("violet", "#EE82EE");
        m.insert("turquoise", "#40E0D0");
        m.insert("coral", "#FF7F50");
        m.insert("salmon", "#FA8072");
        m.insert("khaki", "#F0E68C");
        m.insert("plum", "#DDA0DD");
        m.insert("orchid", "#DA70D6");
        m.insert("tan", "#D2B48C");
        m.insert("beige", "#F5F5DC");
        m.insert("mint", "#98FB98");
        m.insert("lavender", "#E6E6FA");
        m.insert("peach", "#FFCBA4");
        m
    };
    static ref HEX_COLOR_RE: Regex =
        Regex::new(r"^#[0-9A-Fa-f]{6}([0-9A-Fa-f]{2})?$").unwrap();
    static ref HEX6_RE: Regex = Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap();
    static ref RGB_FN_RE: Regex = Regex::new(
        r"^(rgba?)\s*\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*(?:,\s*([\d.]+)\s*)?\)$"
    )
    .unwrap();
}

/// Parse a color in hex, rgb()/rgba(), or named format into `#RRGGBB` form.
///
/// Hex input may carry an alpha component which is discarded. RGB channels
/// must be integers in the 0-255 range; out-of-range values are an error,
/// not clamped.
pub fn parse_color(color_value: &str) -> Result<String> {
    let color_value = color_value.trim();
    if color_value.is_empty() {
        return Err(SvgExtrasError::EmptyColorValue.into());
    }

    // Already hex format: #RRGGBB or #RRGGBBAA
    if HEX_COLOR_RE.is_match(color_value) {
        return Ok(color_value[..7].to_uppercase());
    }

    // RGB format: rgb(255, 0, 255) or rgba(255, 0, 255, 1.0)
    if let Some(caps) = RGB_FN_RE.captures(color_value) {
        let has_alpha = caps.get(5).is_some();
        let arity_ok = match &caps[1] {
            "rgb" => !has_alpha,
            _ => has_alpha,
        };
        if !arity_ok {
            return Err(SvgExtrasError::InvalidColorFormat {
                value: color_value.to_string(),
            }
            .into());
        }

        let mut channels = [0u32; 3];
        for (i, channel) in channels.iter_mut().enumerate() {
            *channel = caps[i + 2].parse().map_err(|_| {
                SvgExtrasError::InvalidColorFormat {
                    value: color_value.to_string(),
                }
            })?;
        }

        let [r, g, b] = channels;
        if channels.iter().any(|&v| v > 255) {
            return Err(SvgExtrasError::RgbOutOfRange { r, g, b }.into());
        }
        return Ok(format!("#{:02X}{:02X}{:02X}", r, g, b));
    }

    // Named colors
    if let Some(hex) = NAMED_COLORS.get(color_value.to_lowercase().as_str()) {
        return Ok((*hex).to_string());
    }

    Err(SvgExtrasError::InvalidColorFormat {
        value: color_value.to_string(),
    }
    .into())
}

/// Validate that a string is a `#RRGGBB` hex color
pub fn validate_hex_color(hex_color: &str) -> bool {
    HEX6_RE.is_match(hex_color)
}

/// Split a `#RRGGBB` color into its channel values
pub fn hex_channels(color: &str) -> Option<(u8, u8, u8)> {
    if !validate_hex_color(color) {
        return None;
    }
    let r = u8::from_str_radix(&color[1..3], 16).ok()?;
    let g = u8::from_str_radix(&color[3..5], 16).ok()?;
    let b = u8::from_str_radix(&color[5..7], 16).ok()?;
    Some((r, g, b))
}

/// Translate a shell-glob pattern (`*`, `?`, `[...]`) into an anchored regex
fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // Find the closing bracket; a leading `!` or `]` is part of the class
                let mut j = i;
                if j < chars.len() && (chars[j] == '!' || chars[j] == ']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    // Unmatched bracket, treat as literal
                    out.push_str("\\[");
                    continue;
                }
                let inner: String = chars[i..j].iter().collect();
                let (negated, body_src) = match inner.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, inner.as_str()),
                };
                let mut body = String::new();
                for (k, bc) in body_src.chars().enumerate() {
                    match bc {
                        '\\' => body.push_str("\\\\"),
                        '[' => body.push_str("\\["),
                        ']' => body.push_str("\\]"),
                        '^' if k == 0 => body.push_str("\\^"),
                        _ => body.push(bc),
                    }
                }
                if body.is_empty() {
                    out.push_str(if negated { "\\[!\\]" } else { "\\[\\]" });
                } else {
                    out.push('[');
                    if negated {
                        out.push('^');
                    }
                    out.push_str(&body);
                    out.push(']');
                }
                i = j + 1;
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

/// Check whether a net name matches a shell-glob pattern
fn glob_match(pattern: &str, name: &str) -> bool {
    match Regex::new(&glob_to_regex(pattern)) {
        Ok(re) => re.is_match(name),
        Err(_) => {
            warn!("Invalid wildcard pattern: {}", pattern);
            false
        }
    }
}

/// Ordered mapping from net name patterns to canonical colors.
///
/// Entries keep insertion order so wildcard ranking stays deterministic;
/// re-inserting an existing pattern overwrites its color in place, which is
/// how command line overrides replace file-sourced entries.
#[derive(Debug, Clone, Default)]
pub struct NetColorMap {
    entries: Vec<(String, String)>,
}

impl NetColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert a pattern with a color in any supported format
    pub fn insert(&mut self, pattern: &str, color_value: &str) -> Result<()> {
        let color = parse_color(color_value)?;
        if let Some(entry) = self.entries.iter_mut().find(|(p, _)| p == pattern) {
            entry.1 = color;
        } else {
            self.entries.push((pattern.to_string(), color));
        }
        Ok(())
    }

    /// Look up the color stored for an exact pattern
    pub fn get(&self, pattern: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == pattern)
            .map(|(_, c)| c.as_str())
    }

    /// Resolve the color for a net name, supporting wildcards.
    ///
    /// Exact matches win over wildcards. Among wildcard patterns the longest
    /// pattern string wins; equal lengths keep insertion order. Returns None
    /// when the map is empty or nothing matches.
    pub fn resolve(&self, net_name: &str) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }

        // Exact match first
        if let Some(color) = self.get(net_name) {
            return Some(color);
        }

        // Wildcard matches, longer patterns first
        let mut wildcards: Vec<&(String, String)> = self
            .entries
            .iter()
            .filter(|(p, _)| p.contains('*') || p.contains('?') || p.contains('['))
            .collect();
        wildcards.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        for (pattern, color) in wildcards {
            if glob_match(pattern, net_name) {
                debug!("Net '{}' matched pattern '{}'", net_name, pattern);
                return Some(color);
            }
        }

        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }
}

/// True for `rgba(...)` values with a zero alpha, which KiCad project files
/// use to mean "no color assigned"
fn is_transparent_rgba(value: &str) -> bool {
    if let Some(caps) = RGB_FN_RE.captures(value.trim()) {
        if &caps[1] == "rgba" {
            if let Some(alpha) = caps.get(5) {
                return alpha.as_str().parse::<f64>().map(|a| a == 0.0).unwrap_or(false);
            }
        }
    }
    false
}

/// Merge one raw pattern/color pair into the map, skipping invalid entries
fn insert_config_entry(map: &mut NetColorMap, pattern: &str, value: &serde_json::Value) {
    if pattern.is_empty() {
        warn!("Skipping color entry with empty net name");
        return;
    }
    let Some(color_value) = value.as_str() else {
        warn!(
            "Skipping invalid color value for net '{}': {}",
            pattern, value
        );
        return;
    };
    if color_value.trim().is_empty() {
        warn!(
            "Skipping invalid color value for net '{}': {}",
            pattern, value
        );
        return;
    }
    if let Err(e) = map.insert(pattern, color_value) {
        warn!("Skipping invalid color for net '{}': {:#}", pattern, e);
    }
}

/// Load net color configuration from a JSON file.
///
/// Three shapes are recognized: a KiCad project file with
/// `net_settings.net_colors` (and optionally netclass definitions), a custom
/// file with top-level `net_colors`, or a bare net-name-to-color object.
/// Explicit net color entries always override netclass-derived ones.
pub fn load_color_config(config_file: &Path) -> Result<NetColorMap> {
    let content =
        std::fs::read_to_string(config_file).with_path_context("read color config", config_file)?;
    let data: serde_json::Value = serde_json::from_str(&content).with_context(|| {
        format!(
            "Failed to load color configuration from {}",
            config_file.display()
        )
    })?;

    let mut map = NetColorMap::new();

    let net_colors_raw = if let Some(settings) = data.get("net_settings") {
        // Netclass hierarchy: class color applies to every pattern assigned
        // to that class, before explicit net colors are merged on top
        if let (Some(classes), Some(patterns)) = (
            settings.get("classes").and_then(|v| v.as_array()),
            settings.get("netclass_patterns").and_then(|v| v.as_array()),
        ) {
            let mut class_colors: HashMap<&str, &str> = HashMap::new();
            for class in classes {
                let Some(name) = class.get("name").and_then(|v| v.as_str()) else {
                    continue;
                };
                let color = class
                    .get("pcb_color")
                    .or_else(|| class.get("color"))
                    .and_then(|v| v.as_str());
                if let Some(color) = color {
                    if is_transparent_rgba(color) {
                        debug!("Netclass '{}' has no color assigned", name);
                        continue;
                    }
                    class_colors.insert(name, color);
                }
            }
            for assignment in patterns {
                let Some(pattern) = assignment.get("pattern").and_then(|v| v.as_str()) else {
                    continue;
                };
                let Some(class_name) = assignment.get("netclass").and_then(|v| v.as_str()) else {
                    continue;
                };
                if let Some(color) = class_colors.get(class_name) {
                    if let Err(e) = map.insert(pattern, color) {
                        warn!("Skipping invalid netclass color for '{}': {:#}", pattern, e);
                    }
                }
            }
        }
        settings.get("net_colors")
    } else if data.get("net_colors").is_some() {
        data.get("net_colors")
    } else {
        Some(&data)
    };

    let Some(net_colors) = net_colors_raw.and_then(|v| v.as_object()) else {
        debug!(
            "No net color configuration found in {}",
            config_file.display()
        );
        return Ok(map);
    };

    for (net_name, color_value) in net_colors {
        insert_config_entry(&mut map, net_name, color_value);
    }

    Ok(map)
}
