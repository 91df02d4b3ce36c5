//! Configuration management for kicad-svg-extras
//!
//! This module handles CLI argument parsing and application settings.

use crate::color::parse_color;
use crate::error::{Result, SvgExtrasError};
use crate::layers::{parse_layer_list, validate_layers, BoardSide};

use anyhow::{anyhow, Context};
use clap::builder::styling;
use clap::{value_parser, Arg, ArgMatches, ColorChoice, Command};
use std::path::PathBuf;
use tracing::info;

/// Build the CLI command
pub fn build_cli() -> Command {
    let styles = styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Blue.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default());

    Command::new("kicad-svg-extras")
        .about("Generate SVG files from KiCad PCB files with per-net color control")
        .author("adamws <adamws@users.noreply.github.com>")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("pcb_file")
                .help("Input KiCad PCB file (.kicad_pcb)")
                .value_name("PCB_FILE")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Output directory for generated SVG files")
                .value_name("DIR")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("side")
                .long("side")
                .help("Board side to render")
                .value_parser(["front", "back", "both"])
                .default_value("front"),
        )
        .arg(
            Arg::new("layers")
                .long("layers")
                .help("Comma-separated layer list overriding the side defaults")
                .value_name("LAYERS"),
        )
        .arg(
            Arg::new("colors")
                .long("colors")
                .help("JSON file with net color definitions")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("net_color")
                .long("net-color")
                .help("Set the color of a single net, overriding the color file (repeatable)")
                .value_name("NET:COLOR")
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("use_css_classes")
                .long("use-css-classes")
                .help("Tag elements with per-net CSS classes instead of rewriting fills")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("background_color")
                .long("background-color")
                .help("Background color of the final document")
                .value_name("COLOR")
                .default_value("#FFFFFF"),
        )
        .arg(
            Arg::new("no_background")
                .long("no-background")
                .help("Do not insert a background rectangle")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fit_to_content")
                .long("fit-to-content")
                .help("Shrink the viewport to the drawn content")
                .value_parser(["none", "all", "edges_only"])
                .default_value("none"),
        )
        .arg(
            Arg::new("skip_zones")
                .long("skip-zones")
                .help("Exclude zone fills from copper rendering")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("keep_intermediates")
                .long("keep-intermediates")
                .help("Keep intermediate files for inspection")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("theme")
                .long("theme")
                .help("KiCad color theme used for plotting")
                .value_name("NAME"),
        )
        .arg(
            Arg::new("metadata")
                .long("metadata")
                .help("Write net/color metadata JSON to this file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (repeatable)")
                .action(clap::ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .help("Suppress progress output and non-error logs")
                .action(clap::ArgAction::SetTrue),
        )
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Input KiCad PCB file
    pub pcb_file: PathBuf,

    /// Output directory for generated SVG files
    pub output_dir: PathBuf,

    /// Board side selection (front, back, both)
    pub side: String,

    /// Explicit comma-separated layer list, replacing the side defaults
    pub layers: Option<String>,

    /// JSON file with net color definitions
    pub colors: Option<PathBuf>,

    /// NET:COLOR overrides applied after the color file
    pub net_color_overrides: Vec<String>,

    /// Style elements via CSS classes instead of fill rewriting
    pub use_css_classes: bool,

    /// Background color of the final document
    pub background_color: String,

    /// Skip background rectangle insertion
    pub no_background: bool,

    /// Viewport fitting mode (none, all, edges_only)
    pub fit_to_content: String,

    /// Exclude zone fills from copper rendering
    pub skip_zones: bool,

    /// Keep intermediate files after the run
    pub keep_intermediates: bool,

    /// KiCad color theme for plotting
    pub theme: Option<String>,

    /// Net metadata JSON output path
    pub metadata: Option<PathBuf>,

    /// Log verbosity level
    pub verbose: u8,

    /// Suppress progress bars and non-error logs
    pub quiet: bool,
}

impl Config {
    /// Parse arguments and apply initial configuration
    pub fn from_args() -> Result<Self> {
        let matches = build_cli().get_matches();
        let config = Self::from_matches(&matches)?;

        // Set up tracing with environment variable support
        // RUST_LOG takes precedence over verbosity flags
        let default_level = if config.quiet {
            "error"
        } else {
            match config.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        };
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

        tracing_subscriber::fmt().with_env_filter(env_filter).init();

        if config.verbose > 0 {
            info!("Configuration: {:?}", config);
        }

        Ok(config)
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let pcb_file = matches
            .get_one::<PathBuf>("pcb_file")
            .cloned()
            .ok_or_else(|| anyhow!("PCB file is required"))?;
        let output_dir = matches
            .get_one::<PathBuf>("output")
            .cloned()
            .ok_or_else(|| anyhow!("Output directory is required"))?;

        let net_color_overrides = matches
            .get_many::<String>("net_color")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        Ok(Config {
            pcb_file,
            output_dir,
            side: matches
                .get_one::<String>("side")
                .cloned()
                .unwrap_or_else(|| "front".to_string()),
            layers: matches.get_one::<String>("layers").cloned(),
            colors: matches.get_one::<PathBuf>("colors").cloned(),
            net_color_overrides,
            use_css_classes: matches.get_flag("use_css_classes"),
            background_color: matches
                .get_one::<String>("background_color")
                .cloned()
                .unwrap_or_else(|| "#FFFFFF".to_string()),
            no_background: matches.get_flag("no_background"),
            fit_to_content: matches
                .get_one::<String>("fit_to_content")
                .cloned()
                .unwrap_or_else(|| "none".to_string()),
            skip_zones: matches.get_flag("skip_zones"),
            keep_intermediates: matches.get_flag("keep_intermediates"),
            theme: matches.get_one::<String>("theme").cloned(),
            metadata: matches.get_one::<PathBuf>("metadata").cloned(),
            verbose: matches.get_count("verbose"),
            quiet: matches.get_flag("quiet"),
        })
    }

    /// Board sides selected for processing
    pub fn get_sides(&self) -> Vec<BoardSide> {
        match self.side.as_str() {
            "back" => vec![BoardSide::Back],
            "both" => vec![BoardSide::Front, BoardSide::Back],
            _ => vec![BoardSide::Front],
        }
    }

    /// Get normalized fit mode
    pub fn get_fit_mode(&self) -> FitMode {
        match self.fit_to_content.as_str() {
            "all" => FitMode::All,
            "edges_only" => FitMode::EdgesOnly,
            _ => FitMode::None,
        }
    }

    /// Layers to render for one side: the explicit `--layers` list when
    /// given, otherwise the side's default set
    pub fn resolved_layers(&self, side: BoardSide) -> Vec<String> {
        match &self.layers {
            Some(csv) => parse_layer_list(csv),
            None => parse_layer_list(side.default_layers()),
        }
    }

    /// Whether progress bars should be shown
    pub fn progress_enabled(&self) -> bool {
        !self.quiet
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        // Validate input file exists
        if !self.pcb_file.exists() {
            return Err(anyhow!(
                "PCB file does not exist: {}",
                self.pcb_file.display()
            ));
        }

        if let Some(colors) = &self.colors {
            if !colors.exists() {
                return Err(anyhow!(
                    "Color configuration file does not exist: {}",
                    colors.display()
                ));
            }
        }

        if let Some(csv) = &self.layers {
            let parsed = parse_layer_list(csv);
            if parsed.is_empty() {
                return Err(anyhow!("Layer list is empty"));
            }
            let invalid = validate_layers(&parsed);
            if !invalid.is_empty() {
                return Err(SvgExtrasError::InvalidLayerNames {
                    names: invalid.join(", "),
                }
                .into());
            }
        }

        parse_color(&self.background_color).with_context(|| {
            format!("Invalid background color: '{}'", self.background_color)
        })?;

        for raw in &self.net_color_overrides {
            let (net, color) = parse_net_color_override(raw)?;
            parse_color(&color)
                .with_context(|| format!("Invalid color for net '{}' in --net-color", net))?;
        }

        // Create output directory if it doesn't exist
        if !self.output_dir.exists() {
            std::fs::create_dir_all(&self.output_dir).with_context(|| {
                format!(
                    "Failed to create output directory: {}",
                    self.output_dir.display()
                )
            })?;
            info!("Created output directory: {}", self.output_dir.display());
        }

        info!("Configuration validation completed successfully");
        Ok(())
    }
}

/// Viewport fitting modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    None,
    All,
    EdgesOnly,
}

impl FitMode {
    pub fn as_str(&self) -> &str {
        match self {
            FitMode::None => "none",
            FitMode::All => "all",
            FitMode::EdgesOnly => "edges_only",
        }
    }
}

/// Splits a `--net-color` value on its first colon. Net names never contain
/// a colon, color values may (never in practice, but the rule is fixed).
pub fn parse_net_color_override(raw: &str) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((net, color)) if !net.is_empty() && !color.is_empty() => {
            Ok((net.to_string(), color.to_string()))
        }
        _ => Err(anyhow!(
            "Invalid --net-color value '{}', expected NET:COLOR",
            raw
        )),
    }
}
