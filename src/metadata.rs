//! Net/color metadata sidecar for downstream tooling.
//!
//! Interactive viewers need to know which net maps to which color or CSS
//! class without re-parsing the SVG, so the pipeline can emit a small JSON
//! document describing the run.

use crate::error::Result;
use crate::layers::is_copper_layer;
use crate::merge::write_atomic;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use std::collections::BTreeMap;
use std::path::Path;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
pub struct NetMetadata {
    pub original_name: String,
    /// Resolved color, `null` for nets rendered with the exporter default.
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_classes: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_class_generic: Option<String>,
}

/// Serializable description of one generation run.
#[derive(Debug, Serialize)]
pub struct SvgMetadata {
    pub format_version: u32,
    pub generated_with_css_classes: bool,
    pub layers: Vec<String>,
    pub copper_layers: Vec<String>,
    pub nets: BTreeMap<String, NetMetadata>,
}

impl SvgMetadata {
    pub fn new(use_css_classes: bool, layers: &[String]) -> Self {
        let copper_layers = layers
            .iter()
            .filter(|layer| is_copper_layer(layer))
            .cloned()
            .collect();
        Self {
            format_version: FORMAT_VERSION,
            generated_with_css_classes: use_css_classes,
            layers: layers.to_vec(),
            copper_layers,
            nets: BTreeMap::new(),
        }
    }

    pub fn record_net(&mut self, net_name: &str, color: Option<&str>) {
        self.nets.insert(
            net_name.to_string(),
            NetMetadata {
                original_name: net_name.to_string(),
                color: color.map(|c| c.to_string()),
                css_classes: None,
                css_class_generic: None,
            },
        );
    }

    /// Attaches a CSS class to a previously recorded net. A `layer` of
    /// `None` sets the generic (layer-independent) class.
    pub fn record_css_class(&mut self, net_name: &str, layer: Option<&str>, class: &str) {
        let entry = match self.nets.get_mut(net_name) {
            Some(entry) => entry,
            None => return,
        };
        match layer {
            Some(layer) => {
                entry
                    .css_classes
                    .get_or_insert_with(BTreeMap::new)
                    .insert(layer.to_string(), class.to_string());
            }
            None => entry.css_class_generic = Some(class.to_string()),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize metadata")?;
        write_atomic(path, &json)?;
        info!("Wrote metadata: {}", path.display());
        Ok(())
    }
}
