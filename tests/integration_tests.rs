//! Integration tests for kicad-svg-extras
//!
//! End-to-end runs of the generation pipeline against an in-memory exporter,
//! covering color configuration files, command line overrides, CSS class
//! styling and multi-side merging.

use std::fs;

use tempfile::TempDir;

use kicad_svg_extras::{
    config::{build_cli, Config},
    exporter::FixtureExporter,
    pipeline::Pipeline,
};

/// Copper color drawn by the fixture exporter before recoloring
const DRAWN_COPPER: &str = "#C83434";

/// Create a board file and a configuration pointing into the temp directory
fn create_test_config(dir: &TempDir) -> Config {
    let pcb_file = dir.path().join("demo.kicad_pcb");
    fs::write(&pcb_file, "(kicad_pcb)").expect("Failed to write board file");

    Config {
        pcb_file,
        output_dir: dir.path().join("out"),
        side: "front".to_string(),
        layers: None,
        colors: None,
        net_color_overrides: Vec::new(),
        use_css_classes: false,
        background_color: "#FFFFFF".to_string(),
        no_background: false,
        fit_to_content: "none".to_string(),
        skip_zones: false,
        keep_intermediates: false,
        theme: None,
        metadata: None,
        verbose: 0,
        quiet: true, // Disable progress bars in tests
    }
}

/// Exporter preloaded with a small two-layer board: three nets on the front
/// copper, a ground track on the back, an outline and one silkscreen label
fn create_demo_exporter() -> FixtureExporter {
    FixtureExporter::new()
        .with_net(1, "GND")
        .with_net(2, "VCC")
        .with_net(3, "/amp/IN+")
        .with_element(
            "GND",
            "F.Cu",
            r#"<path style="fill:#C83434; stroke:#C83434; stroke-width:0.25;" d="M 165 82 L 168 82"/>"#,
        )
        .with_element(
            "GND",
            "B.Cu",
            r#"<path style="fill:#C83434; stroke:#C83434; stroke-width:0.25;" d="M 165 90 L 168 90"/>"#,
        )
        .with_element(
            "VCC",
            "F.Cu",
            r#"<circle style="fill:#C83434;" cx="172" cy="85" r="1"/>"#,
        )
        .with_element(
            "/amp/IN+",
            "F.Cu",
            r#"<path style="fill:#C83434; stroke:#C83434;" d="M 180 85 L 184 85"/>"#,
        )
        .with_board_element(
            "Edge.Cuts",
            r#"<rect x="162" y="79" width="29" height="15" style="fill:none; stroke:#000000; stroke-width:0.1;"/>"#,
        )
        .with_board_element(
            "F.Silkscreen",
            r#"<text x="165" y="80" style="fill:#F2EDA1;">U1</text>"#,
        )
}

fn read_svg(config: &Config, name: &str) -> String {
    fs::read_to_string(config.output_dir.join(name)).expect("Failed to read generated SVG")
}

#[test]
fn test_full_pipeline_with_color_config_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let colors_file = dir.path().join("colors.json");
    fs::write(&colors_file, r##"{"GND": "#00AA00", "/amp/*": "magenta"}"##)
        .expect("Failed to write color config");

    let mut config = create_test_config(&dir);
    config.colors = Some(colors_file);
    config.net_color_overrides = vec!["VCC:#123456".to_string()];

    let mut pipeline = Pipeline::new(config.clone(), Box::new(create_demo_exporter()));
    pipeline.run().expect("Pipeline should succeed");

    let output = read_svg(&config, "front_colored.svg");
    // Exact entry, wildcard entry and command line override all resolved
    assert!(output.contains("#00AA00"));
    assert!(output.contains("#FF00FF"));
    assert!(output.contains("#123456"));
    // Every net has an assigned color, so no copper keeps the drawn color
    assert!(!output.contains(DRAWN_COPPER));
    // Outline and silkscreen carry over untouched
    assert!(output.contains(r#"<rect x="162""#));
    assert!(output.contains("U1"));

    let stats = pipeline.get_generation_stats();
    assert_eq!(stats.nets_colored, 3);
    // Three color groups, each exported on B.Cu and F.Cu
    assert_eq!(stats.groups_exported, 6);
    assert_eq!(
        stats.output_files,
        vec![config.output_dir.join("front_colored.svg")]
    );
}

#[test]
fn test_net_color_override_replaces_file_entry() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let colors_file = dir.path().join("colors.json");
    fs::write(&colors_file, r##"{"GND": "#111111", "VCC": "blue"}"##)
        .expect("Failed to write color config");

    let mut config = create_test_config(&dir);
    config.colors = Some(colors_file);
    config.net_color_overrides = vec!["GND:#00FF00".to_string()];

    let mut pipeline = Pipeline::new(config.clone(), Box::new(create_demo_exporter()));
    pipeline.run().expect("Pipeline should succeed");

    let output = read_svg(&config, "front_colored.svg");
    assert!(output.contains("#00FF00"));
    assert!(output.contains("#0000FF"));
    assert!(!output.contains("#111111"));
}

#[test]
fn test_both_sides_css_pipeline_with_metadata() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(&dir);
    config.side = "both".to_string();
    config.use_css_classes = true;
    config.net_color_overrides = vec!["GND:#00FF00".to_string()];
    config.metadata = Some(dir.path().join("nets.json"));

    let mut pipeline = Pipeline::new(config.clone(), Box::new(create_demo_exporter()));
    pipeline.run().expect("Pipeline should succeed");

    // Side documents are replaced by the merged document
    assert!(config.output_dir.join("colored.svg").exists());
    assert!(!config.output_dir.join("front_colored.svg").exists());
    assert!(!config.output_dir.join("back_colored.svg").exists());

    let output = read_svg(&config, "colored.svg");
    assert!(output.contains(r#"class="net-gnd-f-cu""#));
    assert!(output.contains(r#"class="net-gnd-b-cu""#));
    assert!(output.contains(r#"class="net-amp-inplus-f-cu""#));
    assert!(output.contains("fill: #00FF00;"));
    // Nets without an assigned color keep the drawn copper color in their rules
    assert!(output.contains("fill: #C83434;"));

    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("nets.json")).unwrap())
            .expect("Metadata should be valid JSON");
    assert_eq!(metadata["format_version"], 1);
    assert_eq!(metadata["generated_with_css_classes"], true);
    assert_eq!(metadata["nets"]["GND"]["color"], "#00FF00");
    assert_eq!(metadata["nets"]["GND"]["css_classes"]["F.Cu"], "net-gnd-f-cu");
    assert_eq!(metadata["nets"]["GND"]["css_classes"]["B.Cu"], "net-gnd-b-cu");
    assert_eq!(metadata["nets"]["/amp/IN+"]["original_name"], "/amp/IN+");
    // The plus sign becomes a word so the identifier stays unambiguous
    assert_eq!(
        metadata["nets"]["/amp/IN+"]["css_class_generic"],
        "net-amp-inplus"
    );
}

#[test]
fn test_nets_sharing_color_are_grouped() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(&dir);
    config.layers = Some("F.Cu,Edge.Cuts".to_string());
    config.keep_intermediates = true;
    config.net_color_overrides = vec!["GND:#4D7FC4".to_string(), "VCC:#4D7FC4".to_string()];

    let mut pipeline = Pipeline::new(config.clone(), Box::new(create_demo_exporter()));
    pipeline.run().expect("Pipeline should succeed");

    // Both nets render through one filtered board and one recolored fragment
    let temp_dir = config.output_dir.join("temp_front");
    let group_board = temp_dir.join("color_4D7FC4_front.kicad_pcb");
    assert!(group_board.exists());
    let board_content = fs::read_to_string(&group_board).expect("Failed to read group board");
    assert!(board_content.contains("GND"));
    assert!(board_content.contains("VCC"));
    assert!(temp_dir.join("color_4D7FC4_F_Cu_front.svg").exists());

    let stats = pipeline.get_generation_stats();
    assert_eq!(stats.nets_colored, 2);
    // One shared color group plus the default group holding /amp/IN+
    assert_eq!(stats.groups_exported, 2);
}

#[test]
fn test_fit_to_board_edges_uses_outline_dimensions() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(&dir);
    config.fit_to_content = "edges_only".to_string();
    config.no_background = true;

    let mut pipeline = Pipeline::new(config.clone(), Box::new(create_demo_exporter()));
    pipeline.run().expect("Pipeline should succeed");

    let output = read_svg(&config, "front_colored.svg");
    // The outline rectangle spans 29x15mm; with the fit margin the viewport
    // becomes 31x17mm regardless of silkscreen extents
    assert!(!output.contains(r#"width="29.000200mm""#));
    assert!(output.contains(r#"width="31mm""#));
    assert!(output.contains(r#"height="17mm""#));
}

// Error handling tests

#[test]
fn test_missing_board_file_aborts() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(&dir);
    config.pcb_file = dir.path().join("absent.kicad_pcb");

    let mut pipeline = Pipeline::new(config, Box::new(create_demo_exporter()));
    let error = pipeline.run().expect_err("Missing board must fail");
    assert!(format!("{:#}", error).contains("PCB file does not exist"));
}

// Command line parsing tests

#[test]
fn test_cli_parses_repeated_net_colors() {
    let matches = build_cli()
        .try_get_matches_from([
            "kicad-svg-extras",
            "--net-color",
            "GND:green",
            "--net-color",
            "VCC:#001122",
            "--side",
            "both",
            "-o",
            "out",
            "board.kicad_pcb",
        ])
        .expect("Arguments should parse");

    let overrides: Vec<&String> = matches
        .get_many::<String>("net_color")
        .expect("Overrides should be captured")
        .collect();
    assert_eq!(overrides.len(), 2);
    assert_eq!(matches.get_one::<String>("side").unwrap(), "both");
}

#[test]
fn test_cli_rejects_unknown_side() {
    let result = build_cli().try_get_matches_from([
        "kicad-svg-extras",
        "--side",
        "top",
        "-o",
        "out",
        "board.kicad_pcb",
    ]);
    assert!(result.is_err());
}
