//! Error handling for kicad-svg-extras
//!
//! This module provides unified error handling using anyhow for better error propagation
//! and context information throughout the application.

use anyhow::Context;
use std::path::Path;

pub type Result<T> = anyhow::Result<T>;

/// Extension trait for Results to add context with file paths
pub trait ResultExt<T> {
    /// Add context with file path information
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T>;

    /// Add context with layer information
    fn with_layer_context(self, layer_name: &str) -> Result<T>;

    /// Add context with net information
    fn with_net_context(self, net_name: &str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error> + Send + Sync + 'static,
{
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Failed to {} file: {}", operation, path.as_ref().display()))
    }

    fn with_layer_context(self, layer_name: &str) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Error processing layer {}", layer_name))
    }

    fn with_net_context(self, net_name: &str) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Error processing net '{}'", net_name))
    }
}

/// Specific error types for SVG generation operations
#[derive(Debug, thiserror::Error)]
pub enum SvgExtrasError {
    #[error("Color value cannot be empty")]
    EmptyColorValue,

    #[error("Invalid color format: '{value}'")]
    InvalidColorFormat { value: String },

    #[error("RGB values must be between 0-255, got ({r}, {g}, {b})")]
    RgbOutOfRange { r: u32, g: u32, b: u32 },

    #[error("Invalid old color format: {value}")]
    InvalidOldColor { value: String },

    #[error("Invalid new color format: {value}")]
    InvalidNewColor { value: String },

    #[error("No SVG files to merge")]
    NoFilesToMerge,

    #[error("No valid SVG files found for merging")]
    NoValidSvgFiles,

    #[error(
        "SVG dimension mismatch in {file}: expected width={expected_width}, \
         height={expected_height}, viewBox={expected_viewbox} but got width={width}, \
         height={height}, viewBox={viewbox}"
    )]
    DimensionMismatch {
        file: String,
        expected_width: String,
        expected_height: String,
        expected_viewbox: String,
        width: String,
        height: String,
        viewbox: String,
    },

    #[error("CSS class collision: nets '{first_net}' and '{second_net}' both map to class '{class_name}'")]
    CssClassCollision {
        class_name: String,
        first_net: String,
        second_net: String,
    },

    #[error("Invalid layer names: {names}")]
    InvalidLayerNames { names: String },

    #[error("kicad-cli failed: {stderr}")]
    KicadCliFailed { stderr: String },

    #[error("Net not found in board: {net_name}")]
    NetNotFound { net_name: String },
}
