//! End-to-end generation of net-colored SVG documents
//!
//! Drives the whole run: net enumeration, color resolution, per-side export
//! of color-group fragments through the injected exporter, textual
//! recoloring, and the final stacking-ordered merge with optional viewport
//! fitting and background insertion.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::bounds::{
    calculate_svg_bounding_box, fit_svg_to_content, fit_svg_to_reference, parse_svg_number,
};
use crate::color::{load_color_config, NetColorMap};
use crate::config::{parse_net_color_override, Config, FitMode};
use crate::css::ClassRegistry;
use crate::error::{Result, ResultExt};
use crate::exporter::SvgExporter;
use crate::grouping::{
    color_file_stem, fragment_filename, group_board_filename, group_nets_by_color,
    overlay_filename, raw_fragment_filename, ColorGroups, DEFAULT_GROUP_STEM,
};
use crate::layers::{
    copper_layers, layer_info, non_copper_layers, stacking_priority, BoardSide, LayerType,
};
use crate::merge::{
    add_background_to_svg, extract_svg_dimensions, merge_svg_files, remove_empty_groups_from_file,
    SvgDimensions,
};
use crate::metadata::SvgMetadata;
use crate::progress::ProgressTracker;
use crate::svg_color::{apply_color_to_svg, apply_css_class_to_svg, find_copper_color};

/// Margin in millimeters added around fitted content
const FIT_MARGIN_MM: f64 = 1.0;

/// Slack allowed between the exporter page and the board outline before the
/// page counts as padded. The exporter pads pages for boards below its
/// minimum page size, and the padded page must not end up in the output
/// header.
const PAGE_SLACK_MM: f64 = 1.0;

/// One filtered-board export unit: all nets sharing one resolved color, or a
/// single net when styling with CSS classes.
struct GroupPlan {
    stem: String,
    color: Option<String>,
    nets: Vec<String>,
    board_file: PathBuf,
}

/// What one side pass produced: the merged side document and the edge cuts
/// fragment kept around for fit-to-board-edges.
struct SideArtifacts {
    output: PathBuf,
    edge_fragment: Option<PathBuf>,
}

/// Summary counters surfaced to main for the completion log line.
#[derive(Debug)]
pub struct GenerationStats {
    pub svg_files_merged: usize,
    pub groups_exported: usize,
    pub nets_colored: usize,
    pub output_files: Vec<PathBuf>,
}

pub struct Pipeline {
    config: Config,
    exporter: Box<dyn SvgExporter>,
    progress_tracker: ProgressTracker,
    net_colors: NetColorMap,
    class_registry: ClassRegistry,
    metadata: Option<SvgMetadata>,
    colored_nets: HashSet<String>,
    groups_exported: usize,
    svg_files_merged: usize,
    outputs: Vec<PathBuf>,
}

impl Pipeline {
    pub fn new(config: Config, exporter: Box<dyn SvgExporter>) -> Self {
        let progress_tracker = ProgressTracker::new(config.progress_enabled());
        Self {
            config,
            exporter,
            progress_tracker,
            net_colors: NetColorMap::new(),
            class_registry: ClassRegistry::new(),
            metadata: None,
            colored_nets: HashSet::new(),
            groups_exported: 0,
            svg_files_merged: 0,
            outputs: Vec::new(),
        }
    }

    /// Run the complete generation pipeline
    pub fn run(&mut self) -> Result<()> {
        let start = std::time::Instant::now();
        info!(
            "Starting SVG generation for {}",
            self.config.pcb_file.display()
        );

        self.config
            .validate()
            .context("Configuration validation failed")?;
        self.load_net_colors()
            .context("Failed to load net color configuration")?;
        let net_names = self
            .collect_board_nets()
            .context("Failed to read nets from board")?;

        if self.config.metadata.is_some() {
            self.metadata = Some(SvgMetadata::new(
                self.config.use_css_classes,
                &self.processed_layers(),
            ));
        }

        let sides = self.config.get_sides();
        let mut artifacts = Vec::new();
        let mut temp_dirs = Vec::new();
        let mut forced_dims: Option<SvgDimensions> = None;

        for side in &sides {
            let temp_dir = self.config.output_dir.join(format!("temp_{}", side));
            let side_artifacts = self
                .process_side(*side, &net_names, &temp_dir, &mut forced_dims)
                .with_context(|| format!("Failed to generate {} side", side))?;
            artifacts.push(side_artifacts);
            temp_dirs.push(temp_dir);
        }

        if artifacts.len() == 2 {
            self.merge_sides(&artifacts, forced_dims.as_ref())
                .context("Failed to merge front and back documents")?;
        } else {
            self.outputs = artifacts.iter().map(|a| a.output.clone()).collect();
        }

        if let Some(metadata_path) = self.config.metadata.clone() {
            if let Some(metadata) = &self.metadata {
                metadata
                    .write(&metadata_path)
                    .context("Failed to write metadata file")?;
            }
        }

        self.cleanup_temp_dirs(&temp_dirs)
            .context("Failed to clean up intermediate files")?;

        info!(
            "SVG generation completed in {} ms",
            start.elapsed().as_millis()
        );
        Ok(())
    }

    /// Load the color configuration file and apply CLI overrides on top
    fn load_net_colors(&mut self) -> Result<()> {
        if let Some(colors_file) = &self.config.colors {
            self.net_colors = load_color_config(colors_file)?;
            info!(
                "Loaded {} net color pattern(s) from: {}",
                self.net_colors.len(),
                colors_file.display()
            );
        }

        for raw in &self.config.net_color_overrides {
            let (net, color) = parse_net_color_override(raw)?;
            self.net_colors.insert(&net, &color)?;
            debug!("Net color override: {} -> {}", net, color);
        }
        Ok(())
    }

    fn collect_board_nets(&mut self) -> Result<Vec<String>> {
        let spinner = self.progress_tracker.create_spinner("Reading board nets");
        let nets = self.exporter.list_nets(&self.config.pcb_file)?;
        ProgressTracker::finish_progress(spinner, &format!("Found {} nets", nets.len()));

        let names: Vec<String> = nets.into_iter().map(|net| net.name).collect();
        debug!("Board nets: {:?}", names);
        Ok(names)
    }

    /// Layer union over all processed sides, in first-seen order
    fn processed_layers(&self) -> Vec<String> {
        let mut layers: Vec<String> = Vec::new();
        for side in self.config.get_sides() {
            for layer in self.config.resolved_layers(side) {
                if !layers.contains(&layer) {
                    layers.push(layer);
                }
            }
        }
        layers
    }

    /// Export, recolor and merge everything for one board side
    fn process_side(
        &mut self,
        side: BoardSide,
        net_names: &[String],
        temp_dir: &Path,
        forced_dims: &mut Option<SvgDimensions>,
    ) -> Result<SideArtifacts> {
        info!("Processing {} side...", side);
        fs::create_dir_all(temp_dir)
            .with_context(|| format!("Failed to create directory: {}", temp_dir.display()))?;

        let layers = self.config.resolved_layers(side);
        let copper = copper_layers(&layers);
        let non_copper = non_copper_layers(&layers);

        let side_nets = self.side_nets(side, net_names)?;
        let groups = group_nets_by_color(&side_nets, &self.net_colors);
        info!(
            "{} side: {} net(s) in {} color group(s), {} with default colors",
            side,
            groups.colored_net_count(),
            groups.group_count(),
            groups.default_nets().len()
        );
        self.record_side_nets(&groups);

        let plans = self.write_group_boards(&groups, side, temp_dir)?;
        let mut fragments = self.export_copper_fragments(&plans, &copper, side, temp_dir)?;

        let mut edge_fragment = None;
        for layer in &non_copper {
            let dest = temp_dir.join(overlay_filename(layer, side));
            match self.exporter.export_svg(
                &self.config.pcb_file,
                std::slice::from_ref(layer),
                self.config.theme.as_deref(),
                &dest,
            ) {
                Ok(()) => {
                    debug!("Generated {} overlay: {}", layer, dest.display());
                    if layer_info(layer).layer_type == LayerType::EdgeCuts {
                        edge_fragment = Some(dest.clone());
                    }
                    fragments.push((layer.clone(), dest));
                }
                Err(error) => {
                    warn!(
                        "Failed to export {} overlay for {} side: {:#}",
                        layer, side, error
                    );
                }
            }
        }

        if forced_dims.is_none() {
            if let Some(edge) = &edge_fragment {
                *forced_dims = detect_forced_dimensions(edge)?;
            }
        }

        // Stable sort keeps the plan order inside each priority band, so
        // the opposite side's copper stays underneath this side's.
        fragments.sort_by_key(|(layer, _)| stacking_priority(layer));
        let ordered: Vec<PathBuf> = fragments.into_iter().map(|(_, path)| path).collect();

        let side_output = self.config.output_dir.join(format!("{}_colored.svg", side));
        self.svg_files_merged += ordered.len();
        merge_svg_files(&ordered, &side_output, None, forced_dims.as_ref())
            .with_context(|| format!("Failed to merge {} side fragments", side))?;

        let final_document = self.config.get_sides().len() == 1;
        self.finalize_document(&side_output, edge_fragment.as_deref(), final_document)?;
        info!("Created colored SVG: {}", side_output.display());

        Ok(SideArtifacts {
            output: side_output,
            edge_fragment,
        })
    }

    /// Nets that actually have copper on the given side
    fn side_nets(&self, side: BoardSide, net_names: &[String]) -> Result<Vec<String>> {
        let mut present = Vec::new();
        for net_name in net_names {
            if self
                .exporter
                .net_has_elements_on_side(&self.config.pcb_file, net_name, side)?
            {
                present.push(net_name.clone());
            } else {
                debug!(
                    "Skipping net '{}' on {} side (no elements found)",
                    net_name, side
                );
            }
        }
        Ok(present)
    }

    fn record_side_nets(&mut self, groups: &ColorGroups) {
        for (color, nets) in groups.color_groups() {
            for net in nets {
                self.colored_nets.insert(net.clone());
                if let Some(metadata) = &mut self.metadata {
                    metadata.record_net(net, Some(color));
                }
            }
        }
        if let Some(metadata) = &mut self.metadata {
            for net in groups.default_nets() {
                metadata.record_net(net, None);
            }
        }
    }

    /// Write one filtered board per export unit.
    ///
    /// With CSS classes every net becomes its own unit so that each one can
    /// carry a distinct class; otherwise nets sharing a color are exported
    /// together. A failed board write drops that unit with a warning.
    fn write_group_boards(
        &mut self,
        groups: &ColorGroups,
        side: BoardSide,
        temp_dir: &Path,
    ) -> Result<Vec<GroupPlan>> {
        let mut specs: Vec<(String, Option<String>, Vec<String>)> = Vec::new();
        if self.config.use_css_classes {
            for net in groups.default_nets() {
                let stem = self.class_registry.register(net, None)?;
                specs.push((stem, None, vec![net.clone()]));
            }
            for (color, nets) in groups.color_groups() {
                for net in nets {
                    let stem = self.class_registry.register(net, None)?;
                    specs.push((stem, Some(color.to_string()), vec![net.clone()]));
                }
            }
        } else {
            if !groups.default_nets().is_empty() {
                specs.push((
                    DEFAULT_GROUP_STEM.to_string(),
                    None,
                    groups.default_nets().to_vec(),
                ));
            }
            for (color, nets) in groups.color_groups() {
                specs.push((color_file_stem(color), Some(color.to_string()), nets.to_vec()));
            }
        }

        let mut plans = Vec::new();
        for (stem, color, nets) in specs {
            let board_file = temp_dir.join(group_board_filename(&stem, side));
            match self.exporter.write_filtered_board(
                &self.config.pcb_file,
                &nets,
                self.config.skip_zones,
                &board_file,
            ) {
                Ok(()) => {
                    if self.config.use_css_classes {
                        if let Some(metadata) = &mut self.metadata {
                            metadata.record_css_class(&nets[0], None, &stem);
                        }
                    }
                    plans.push(GroupPlan {
                        stem,
                        color,
                        nets,
                        board_file,
                    });
                }
                Err(error) => {
                    warn!(
                        "Failed to write filtered board for group '{}': {:#}",
                        stem, error
                    );
                }
            }
        }
        Ok(plans)
    }

    /// Export and style one fragment per plan per copper layer, layer-major
    /// so a whole layer stays contiguous in the merge order
    fn export_copper_fragments(
        &mut self,
        plans: &[GroupPlan],
        copper: &[String],
        side: BoardSide,
        temp_dir: &Path,
    ) -> Result<Vec<(String, PathBuf)>> {
        let mut fragments = Vec::new();
        if plans.is_empty() || copper.is_empty() {
            return Ok(fragments);
        }

        let progress = self
            .progress_tracker
            .create_group_progress(plans.len() * copper.len());

        for layer in copper {
            for plan in plans {
                ProgressTracker::update_progress(
                    &progress,
                    1,
                    Some(&format!("{} on {}", plan.stem, layer)),
                );

                let registered_class = if self.config.use_css_classes {
                    Some(self.class_registry.register(&plan.nets[0], Some(layer))?)
                } else {
                    None
                };

                let raw_file = temp_dir.join(raw_fragment_filename(&plan.stem, layer, side));
                let styled_file = temp_dir.join(fragment_filename(&plan.stem, layer, side));
                match self.export_group_fragment(plan, layer, &raw_file, &styled_file) {
                    Ok(()) => {
                        self.groups_exported += 1;
                        if let Some(class) = registered_class {
                            if let Some(metadata) = &mut self.metadata {
                                metadata.record_css_class(&plan.nets[0], Some(layer), &class);
                            }
                        }
                        fragments.push((layer.clone(), styled_file));
                    }
                    Err(error) => {
                        warn!(
                            "Failed to export group '{}' on {}: {:#}",
                            plan.stem, layer, error
                        );
                    }
                }
            }
        }

        ProgressTracker::finish_progress(progress, "Net group export complete");
        Ok(fragments)
    }

    /// Export one plan on one copper layer and apply its styling
    fn export_group_fragment(
        &self,
        plan: &GroupPlan,
        layer: &String,
        raw_file: &Path,
        styled_file: &Path,
    ) -> Result<()> {
        let theme = self.config.theme.as_deref();

        if self.config.use_css_classes {
            self.exporter
                .export_svg(&plan.board_file, std::slice::from_ref(layer), theme, raw_file)?;

            let net_name = &plan.nets[0];
            let fallback_color = match &plan.color {
                Some(color) => color.clone(),
                None => {
                    let content =
                        fs::read_to_string(raw_file).with_path_context("read SVG", raw_file)?;
                    match find_copper_color(&content) {
                        Some(color) => color,
                        None => {
                            debug!(
                                "No drawn color in {}, keeping fragment unstyled",
                                raw_file.display()
                            );
                            fs::copy(raw_file, styled_file)
                                .with_path_context("copy SVG", raw_file)?;
                            return Ok(());
                        }
                    }
                }
            };
            apply_css_class_to_svg(raw_file, styled_file, net_name, &fallback_color, Some(layer))?;
        } else if let Some(color) = &plan.color {
            self.exporter
                .export_svg(&plan.board_file, std::slice::from_ref(layer), theme, raw_file)?;
            apply_color_to_svg(raw_file, styled_file, color)?;
        } else {
            // The default group keeps the exporter's native coloring
            self.exporter.export_svg(
                &plan.board_file,
                std::slice::from_ref(layer),
                theme,
                styled_file,
            )?;
        }
        Ok(())
    }

    /// Merge the two side documents into `colored.svg` and drop the side
    /// files once the merged document is complete
    fn merge_sides(
        &mut self,
        artifacts: &[SideArtifacts],
        forced_dims: Option<&SvgDimensions>,
    ) -> Result<()> {
        let merged_output = self.config.output_dir.join("colored.svg");
        info!("Merging both sides into: {}", merged_output.display());

        let side_files: Vec<PathBuf> = artifacts.iter().map(|a| a.output.clone()).collect();
        self.svg_files_merged += side_files.len();
        if let Err(error) = merge_svg_files(&side_files, &merged_output, None, forced_dims) {
            info!("Individual side files have been kept.");
            return Err(error);
        }

        let edge_fragment = artifacts.iter().find_map(|a| a.edge_fragment.as_deref());
        self.finalize_document(&merged_output, edge_fragment, true)?;
        info!("Created merged SVG: {}", merged_output.display());

        for artifact in artifacts {
            if artifact.output.exists() {
                fs::remove_file(&artifact.output)
                    .with_path_context("remove", &artifact.output)?;
            }
        }
        self.outputs = vec![merged_output];
        Ok(())
    }

    /// Post-merge cleanup of one document: empty group removal, then
    /// viewport fitting on final documents, then the background rectangle.
    /// Fitting must precede the background so the background never counts
    /// as drawable content.
    fn finalize_document(
        &self,
        svg_file: &Path,
        edge_fragment: Option<&Path>,
        final_document: bool,
    ) -> Result<()> {
        remove_empty_groups_from_file(svg_file)?;

        if final_document {
            match self.config.get_fit_mode() {
                FitMode::None => {}
                FitMode::All => fit_svg_to_content(svg_file, FIT_MARGIN_MM)?,
                FitMode::EdgesOnly => match edge_fragment {
                    Some(reference) => fit_svg_to_reference(svg_file, reference, FIT_MARGIN_MM)?,
                    None => warn!("No edge cuts fragment available, skipping fit to board edges"),
                },
            }
        }

        if !self.config.no_background {
            add_background_to_svg(svg_file, &self.config.background_color)?;
        }
        Ok(())
    }

    fn cleanup_temp_dirs(&self, temp_dirs: &[PathBuf]) -> Result<()> {
        for temp_dir in temp_dirs {
            if !temp_dir.exists() {
                continue;
            }
            if self.config.keep_intermediates {
                info!("Intermediate files kept in: {}", temp_dir.display());
            } else {
                fs::remove_dir_all(temp_dir).with_context(|| {
                    format!("Failed to remove directory: {}", temp_dir.display())
                })?;
            }
        }
        Ok(())
    }

    pub fn get_generation_stats(&self) -> GenerationStats {
        GenerationStats {
            svg_files_merged: self.svg_files_merged,
            groups_exported: self.groups_exported,
            nets_colored: self.colored_nets.len(),
            output_files: self.outputs.clone(),
        }
    }
}

/// Compare the exporter page against the drawn board outline and force the
/// output header down to the outline when the page is padded.
fn detect_forced_dimensions(edge_fragment: &Path) -> Result<Option<SvgDimensions>> {
    let content =
        fs::read_to_string(edge_fragment).with_path_context("read SVG", edge_fragment)?;
    let dims = extract_svg_dimensions(&content);
    let (page_width, page_height) = match (&dims.width, &dims.height) {
        (Some(width), Some(height)) => (parse_svg_number(width), parse_svg_number(height)),
        _ => return Ok(None),
    };

    let bounds = match calculate_svg_bounding_box(&content, 0.0) {
        Some(bounds) => bounds,
        None => return Ok(None),
    };

    let padded = page_width - bounds.width() > PAGE_SLACK_MM
        || page_height - bounds.height() > PAGE_SLACK_MM;
    if !padded {
        return Ok(None);
    }

    info!(
        "Exporter page ({:.3}x{:.3}mm) is padded beyond the board outline ({:.3}x{:.3}mm), forcing output dimensions",
        page_width,
        page_height,
        bounds.width(),
        bounds.height()
    );
    Ok(Some(SvgDimensions::new(
        &format!("{:.6}mm", bounds.width()),
        &format!("{:.6}mm", bounds.height()),
        &format!(
            "{:.4} {:.4} {:.4} {:.4}",
            bounds.min_x,
            bounds.min_y,
            bounds.width(),
            bounds.height()
        ),
    )))
}
