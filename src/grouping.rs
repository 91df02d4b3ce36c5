//! Net grouping by resolved color
//!
//! Rendering one filtered board per net would mean one exporter invocation
//! per net. Grouping nets that resolve to the same color collapses that to
//! one invocation per distinct color plus one for the default group.

use crate::color::NetColorMap;
use crate::layers::BoardSide;
use tracing::debug;

/// Nets bucketed by resolved output color.
///
/// Group order is first-seen resolution order and nets inside a group keep
/// input order, so the downstream artifact list is deterministic.
#[derive(Debug, Default)]
pub struct ColorGroups {
    groups: Vec<(String, Vec<String>)>,
    default_nets: Vec<String>,
}

impl ColorGroups {
    /// Iterate (color, nets) groups in plan order
    pub fn color_groups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|(color, nets)| (color.as_str(), nets.as_slice()))
    }

    /// Nets left in the exporter's native coloring
    pub fn default_nets(&self) -> &[String] {
        &self.default_nets
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn colored_net_count(&self) -> usize {
        self.groups.iter().map(|(_, nets)| nets.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.default_nets.is_empty()
    }
}

/// Bucket nets by their resolved color. Nets without a match go to the
/// default group.
pub fn group_nets_by_color(net_names: &[String], net_colors: &NetColorMap) -> ColorGroups {
    let mut result = ColorGroups::default();

    for net_name in net_names {
        match net_colors.resolve(net_name) {
            Some(color) => {
                debug!("Net '{}' resolved to color {}", net_name, color);
                match result.groups.iter_mut().find(|(c, _)| c.as_str() == color) {
                    Some((_, nets)) => nets.push(net_name.clone()),
                    None => result
                        .groups
                        .push((color.to_string(), vec![net_name.clone()])),
                }
            }
            None => result.default_nets.push(net_name.clone()),
        }
    }

    result
}

/// Stem shared by the default group's board and fragment files
pub const DEFAULT_GROUP_STEM: &str = "default_nets";

/// Filesystem-safe stem for a color group's artifact names
pub fn color_file_stem(color: &str) -> String {
    color
        .replace('#', "color_")
        .replace('/', "_")
        .replace('\\', "_")
}

/// Filesystem-safe token for a layer name, e.g. `F.Cu` -> `F_Cu`
pub fn layer_file_token(layer_name: &str) -> String {
    layer_name.replace('.', "_")
}

/// Name of the raw exporter output for one group on one copper layer
pub fn raw_fragment_filename(stem: &str, layer_name: &str, side: BoardSide) -> String {
    format!("raw_{}_{}_{}.svg", stem, layer_file_token(layer_name), side)
}

/// Name of the recolored fragment for one group on one copper layer
pub fn fragment_filename(stem: &str, layer_name: &str, side: BoardSide) -> String {
    format!("{}_{}_{}.svg", stem, layer_file_token(layer_name), side)
}

/// Name of a non-copper overlay fragment, e.g. `edge_cuts_front.svg`
pub fn overlay_filename(layer_name: &str, side: BoardSide) -> String {
    format!("{}_{}.svg", layer_file_token(layer_name).to_lowercase(), side)
}

/// Name of the filtered board written for one group
pub fn group_board_filename(stem: &str, side: BoardSide) -> String {
    format!("{}_{}.kicad_pcb", stem, side)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nets(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_groups_nets_sharing_a_color() {
        let mut map = NetColorMap::new();
        map.insert("GND", "#00FF00").unwrap();
        map.insert("VCC", "#00FF00").unwrap();
        map.insert("CLK", "red").unwrap();

        let groups = group_nets_by_color(&nets(&["GND", "VCC", "CLK", "SIG"]), &map);

        let collected: Vec<(&str, &[String])> = groups.color_groups().collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].0, "#00FF00");
        assert_eq!(collected[0].1, nets(&["GND", "VCC"]).as_slice());
        assert_eq!(collected[1].0, "#FF0000");
        assert_eq!(collected[1].1, nets(&["CLK"]).as_slice());
        assert_eq!(groups.default_nets(), nets(&["SIG"]).as_slice());
        assert_eq!(groups.group_count(), 2);
        assert_eq!(groups.colored_net_count(), 3);
    }

    #[test]
    fn test_group_order_follows_net_order() {
        let mut map = NetColorMap::new();
        map.insert("A", "#0000FF").unwrap();
        map.insert("B", "#FF0000").unwrap();
        map.insert("C", "#0000FF").unwrap();

        let groups = group_nets_by_color(&nets(&["B", "A", "C"]), &map);

        let colors: Vec<&str> = groups.color_groups().map(|(c, _)| c).collect();
        assert_eq!(colors, vec!["#FF0000", "#0000FF"]);
    }

    #[test]
    fn test_wildcards_participate_in_grouping() {
        let mut map = NetColorMap::new();
        map.insert("DATA*", "#123456").unwrap();

        let groups = group_nets_by_color(&nets(&["DATA0", "DATA1", "ADDR0"]), &map);

        let collected: Vec<(&str, &[String])> = groups.color_groups().collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].1, nets(&["DATA0", "DATA1"]).as_slice());
        assert_eq!(groups.default_nets(), nets(&["ADDR0"]).as_slice());
    }

    #[test]
    fn test_empty_map_leaves_all_nets_default() {
        let map = NetColorMap::new();
        let groups = group_nets_by_color(&nets(&["GND", "VCC"]), &map);

        assert_eq!(groups.group_count(), 0);
        assert_eq!(groups.default_nets().len(), 2);
        assert!(!groups.is_empty());
    }

    #[test]
    fn test_artifact_filenames() {
        assert_eq!(color_file_stem("#FF0000"), "color_FF0000");
        assert_eq!(layer_file_token("F.Cu"), "F_Cu");
        assert_eq!(
            raw_fragment_filename("color_FF0000", "F.Cu", BoardSide::Front),
            "raw_color_FF0000_F_Cu_front.svg"
        );
        assert_eq!(
            fragment_filename("color_FF0000", "B.Cu", BoardSide::Back),
            "color_FF0000_B_Cu_back.svg"
        );
        assert_eq!(
            fragment_filename(DEFAULT_GROUP_STEM, "F.Cu", BoardSide::Front),
            "default_nets_F_Cu_front.svg"
        );
        assert_eq!(
            overlay_filename("Edge.Cuts", BoardSide::Front),
            "edge_cuts_front.svg"
        );
        assert_eq!(
            overlay_filename("F.Silkscreen", BoardSide::Front),
            "f_silkscreen_front.svg"
        );
        assert_eq!(
            group_board_filename("default_nets", BoardSide::Back),
            "default_nets_back.kicad_pcb"
        );
    }
}
