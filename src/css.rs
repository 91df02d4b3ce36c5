//! CSS class name generation for per-net styling
//!
//! Net names from PCB files may contain characters that are not valid in CSS
//! identifiers. This module converts arbitrary net names into safe class names
//! and tracks class ownership so that two different nets can never end up
//! sharing a selector.

use std::collections::HashMap;

use crate::error::{Result, SvgExtrasError};

/// Convert a net name to a valid CSS class name, e.g. `GND` -> `net-gnd`.
pub fn net_name_to_css_class(net_name: &str) -> String {
    let mut css_name = net_name.to_lowercase();

    // Symbols without a hyphen equivalent become words
    css_name = css_name.replace('+', "plus");
    css_name = css_name.replace('%', "pct");

    // Replace common problematic characters
    for ch in ['/', '\\', '(', ')', ' ', '.', '_', '{', '}', ':'] {
        css_name = css_name.replace(ch, "-");
    }
    css_name = css_name.replace('<', "");
    css_name = css_name.replace('>', "");

    // Drop anything still outside the identifier alphabet
    css_name.retain(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    // Remove multiple consecutive dashes
    while css_name.contains("--") {
        css_name = css_name.replace("--", "-");
    }

    // Remove leading/trailing dashes
    let mut css_name = css_name.trim_matches('-').to_string();

    // If empty or only invalid chars, use a default
    if css_name.is_empty() {
        css_name = "unknown-net".to_string();
    }

    // Ensure it starts with a letter (CSS requirement)
    let starts_with_letter = css_name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic())
        .unwrap_or(false);
    if !starts_with_letter {
        css_name = format!("net-{}", css_name);
    }

    format!("net-{}", css_name)
}

/// Layer-scoped class name, e.g. (`GND`, `F.Cu`) -> `net-gnd-f-cu`.
///
/// The same net gets distinct classes on distinct layers so that per-layer
/// fallback colors stay independent in the merged document.
pub fn net_layer_css_class(net_name: &str, layer_name: &str) -> String {
    let mut suffix = layer_name.to_lowercase();
    for ch in ['.', ' ', '_'] {
        suffix = suffix.replace(ch, "-");
    }
    format!("{}-{}", net_name_to_css_class(net_name), suffix)
}

/// Tracks which net owns which class name for one generation run.
///
/// Distinct nets that sanitize to the same class would silently style each
/// other's copper in the merged output, so a collision aborts the run.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    owners: HashMap<String, String>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the class name for a net, optionally scoped to a layer.
    ///
    /// Returns the class name. Re-registering the same net is a no-op;
    /// a different net claiming an already-owned class is a fatal error.
    pub fn register(&mut self, net_name: &str, layer_name: Option<&str>) -> Result<String> {
        let class_name = match layer_name {
            Some(layer) => net_layer_css_class(net_name, layer),
            None => net_name_to_css_class(net_name),
        };

        if let Some(owner) = self.owners.get(&class_name) {
            if owner != net_name {
                return Err(SvgExtrasError::CssClassCollision {
                    first_net: owner.clone(),
                    second_net: net_name.to_string(),
                    class_name,
                }
                .into());
            }
            return Ok(class_name);
        }

        self.owners
            .insert(class_name.clone(), net_name.to_string());
        Ok(class_name)
    }
}
