//! kicad-svg-extras - Generate net-colored SVG files from KiCad PCB files
//!
//! This crate drives `kicad-cli` to export SVG fragments for groups of nets,
//! recolors copper by net (directly or through CSS classes) and merges the
//! fragments into a single document per board side.

pub mod bounds;
pub mod color;
pub mod config;
pub mod css;
pub mod error;
pub mod exporter;
pub mod grouping;
pub mod layers;
pub mod merge;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod svg_color;
