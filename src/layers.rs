//! Layer management utilities for KiCad PCB processing
//!
//! Provides the standard KiCad layer registry with copper classification,
//! board side, and the stacking priority that orders layers in merged output.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;

/// Type classification for KiCad layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Copper,
    Silkscreen,
    SolderMask,
    SolderPaste,
    Fabrication,
    Courtyard,
    Adhesive,
    EdgeCuts,
    Documentation,
    User,
    Unknown,
}

impl LayerType {
    pub fn is_copper(self) -> bool {
        self == LayerType::Copper
    }
}

/// Which side of the board a layer sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
    Internal,
}

/// Information about a KiCad layer
#[derive(Debug, Clone)]
pub struct LayerInfo {
    pub name: String,
    pub layer_type: LayerType,
    pub side: Option<Side>,
}

/// Physical board side for per-side rendering passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardSide {
    Front,
    Back,
}

impl BoardSide {
    pub fn as_str(self) -> &'static str {
        match self {
            BoardSide::Front => "front",
            BoardSide::Back => "back",
        }
    }

    /// Copper layer carrying this side's net geometry
    pub fn copper_layer(self) -> &'static str {
        match self {
            BoardSide::Front => "F.Cu",
            BoardSide::Back => "B.Cu",
        }
    }

    pub fn silkscreen_layer(self) -> &'static str {
        match self {
            BoardSide::Front => "F.Silkscreen",
            BoardSide::Back => "B.Silkscreen",
        }
    }

    /// Default layer set when the user gives no explicit `--layers` list.
    /// The opposite side's copper is included first so it shows through
    /// underneath, matching how the board looks when held up to light.
    pub fn default_layers(self) -> &'static str {
        match self {
            BoardSide::Front => "B.Cu,F.Cu,F.Silkscreen,Edge.Cuts",
            BoardSide::Back => "F.Cu,B.Cu,B.Silkscreen,Edge.Cuts",
        }
    }
}

impl fmt::Display for BoardSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

lazy_static! {
    /// Standard KiCad layer definitions, keyed by canonical name
    static ref LAYER_DEFINITIONS: HashMap<String, LayerInfo> = build_layer_definitions();

    /// Legacy layer names still found in older boards and scripts
    static ref LAYER_ALIASES: HashMap<&'static str, &'static str> = {
        let mut aliases = HashMap::new();
        aliases.insert("F.SilkS", "F.Silkscreen");
        aliases.insert("B.SilkS", "B.Silkscreen");
        aliases.insert("F.CrtYd", "F.Courtyard");
        aliases.insert("B.CrtYd", "B.Courtyard");
        aliases.insert("F.Adhes", "F.Adhesive");
        aliases.insert("B.Adhes", "B.Adhesive");
        aliases
    };
}

fn build_layer_definitions() -> HashMap<String, LayerInfo> {
    fn entry(
        defs: &mut HashMap<String, LayerInfo>,
        name: &str,
        layer_type: LayerType,
        side: Option<Side>,
    ) {
        defs.insert(
            name.to_string(),
            LayerInfo {
                name: name.to_string(),
                layer_type,
                side,
            },
        );
    }

    let mut defs = HashMap::new();

    // Copper layers
    entry(&mut defs, "F.Cu", LayerType::Copper, Some(Side::Front));
    entry(&mut defs, "B.Cu", LayerType::Copper, Some(Side::Back));
    for i in 1..=30 {
        entry(
            &mut defs,
            &format!("In{}.Cu", i),
            LayerType::Copper,
            Some(Side::Internal),
        );
    }

    // Paired technical layers
    for (front, back, layer_type) in [
        ("F.Silkscreen", "B.Silkscreen", LayerType::Silkscreen),
        ("F.Mask", "B.Mask", LayerType::SolderMask),
        ("F.Paste", "B.Paste", LayerType::SolderPaste),
        ("F.Fab", "B.Fab", LayerType::Fabrication),
        ("F.Courtyard", "B.Courtyard", LayerType::Courtyard),
        ("F.Adhesive", "B.Adhesive", LayerType::Adhesive),
    ] {
        entry(&mut defs, front, layer_type, Some(Side::Front));
        entry(&mut defs, back, layer_type, Some(Side::Back));
    }

    // Board definition
    entry(&mut defs, "Edge.Cuts", LayerType::EdgeCuts, None);

    // Documentation layers
    for name in ["Dwgs.User", "Cmts.User", "Eco1.User", "Eco2.User", "Margin"] {
        entry(&mut defs, name, LayerType::Documentation, None);
    }

    // User-defined layers
    for i in 1..=9 {
        entry(&mut defs, &format!("User.{}", i), LayerType::User, None);
    }

    defs
}

/// Resolve a legacy alias to its canonical layer name. Unknown names pass
/// through unchanged.
pub fn canonical_layer_name(layer_name: &str) -> &str {
    LAYER_ALIASES.get(layer_name).copied().unwrap_or(layer_name)
}

/// Get layer information for a layer name, accepting legacy aliases.
/// Unrecognized names yield `LayerType::Unknown`.
pub fn layer_info(layer_name: &str) -> LayerInfo {
    let canonical = canonical_layer_name(layer_name);
    LAYER_DEFINITIONS
        .get(canonical)
        .cloned()
        .unwrap_or_else(|| LayerInfo {
            name: canonical.to_string(),
            layer_type: LayerType::Unknown,
            side: None,
        })
}

pub fn is_copper_layer(layer_name: &str) -> bool {
    layer_info(layer_name).layer_type.is_copper()
}

/// Parse a comma-separated layer specification into canonical layer names.
/// Whitespace around names is trimmed and empty items are dropped.
pub fn parse_layer_list(layer_spec: &str) -> Vec<String> {
    layer_spec
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| canonical_layer_name(name).to_string())
        .collect()
}

/// Return the subset of names that are not known KiCad layers
pub fn validate_layers(layer_names: &[String]) -> Vec<String> {
    layer_names
        .iter()
        .filter(|name| layer_info(name).layer_type == LayerType::Unknown)
        .cloned()
        .collect()
}

pub fn copper_layers(layer_names: &[String]) -> Vec<String> {
    layer_names
        .iter()
        .filter(|name| is_copper_layer(name))
        .cloned()
        .collect()
}

pub fn non_copper_layers(layer_names: &[String]) -> Vec<String> {
    layer_names
        .iter()
        .filter(|name| !is_copper_layer(name))
        .cloned()
        .collect()
}

/// Compositing order for merged output. Lower values are drawn first and end
/// up at the bottom; the board outline sits under copper, silkscreen on top.
pub fn stacking_priority(layer_name: &str) -> u8 {
    match layer_info(layer_name).layer_type {
        LayerType::EdgeCuts => 0,
        LayerType::Copper => 1,
        LayerType::SolderMask => 2,
        LayerType::SolderPaste => 3,
        LayerType::Adhesive => 4,
        LayerType::Fabrication => 5,
        LayerType::Courtyard => 6,
        LayerType::Documentation => 7,
        LayerType::User => 8,
        LayerType::Silkscreen => 9,
        LayerType::Unknown => 10,
    }
}
