//! Board-to-SVG export backends.
//!
//! The pipeline talks to the CAD toolchain through the [`SvgExporter`]
//! trait. The production implementation shells out to `kicad-cli` and
//! answers net queries by reading the board file's s-expression text, so no
//! CAD library binding is required. [`FixtureExporter`] is an in-memory
//! stand-in used by the integration tests.

use crate::error::{Result, ResultExt, SvgExtrasError};
use crate::layers::BoardSide;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::process::Command;

/// Net name used for board elements that carry no net assignment
/// (net code 0 in the board file).
pub const NO_NET: &str = "<no_net>";

/// A net as declared in the board's net table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInfo {
    pub code: i32,
    pub name: String,
}

/// Capability interface over the CAD toolchain. Injected into the pipeline
/// so tests can run without KiCad installed.
pub trait SvgExporter {
    /// All nets declared by the board, `<no_net>` included.
    fn list_nets(&self, board: &Path) -> Result<Vec<NetInfo>>;

    /// Whether the net has any copper element on the given board side.
    fn net_has_elements_on_side(&self, board: &Path, net_name: &str, side: BoardSide)
        -> Result<bool>;

    /// Writes a derived board containing only copper elements of the given
    /// nets. `skip_zones` drops zone fills entirely.
    fn write_filtered_board(
        &self,
        board: &Path,
        nets: &[String],
        skip_zones: bool,
        dest: &Path,
    ) -> Result<()>;

    /// Exports the given layers of a board into a single SVG file, drawing
    /// sheet excluded and page size taken from the board.
    fn export_svg(
        &self,
        board: &Path,
        layers: &[String],
        theme: Option<&str>,
        dest: &Path,
    ) -> Result<()>;
}

lazy_static! {
    static ref NET_DECL_RE: Regex = Regex::new(r#"\(net\s+(\d+)\s+"([^"]*)"\)"#).unwrap();
    static ref NET_REF_RE: Regex = Regex::new(r"\(net\s+(\d+)").unwrap();
}

/// Exporter backed by the `kicad-cli` command line tool.
pub struct KicadCliExporter {
    kicad_cli: String,
}

impl Default for KicadCliExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl KicadCliExporter {
    pub fn new() -> Self {
        Self {
            kicad_cli: "kicad-cli".to_string(),
        }
    }

    /// Overrides the executable name, e.g. an absolute path to a specific
    /// KiCad installation.
    pub fn with_command(mut self, command: &str) -> Self {
        self.kicad_cli = command.to_string();
        self
    }

    /// Verifies the tool can be executed and returns its version string.
    pub fn check_available(&self) -> Result<String> {
        let output = Command::new(&self.kicad_cli)
            .arg("--version")
            .output()
            .with_context(|| format!("Failed to run '{}', is KiCad installed?", self.kicad_cli))?;
        if !output.status.success() {
            return Err(SvgExtrasError::KicadCliFailed {
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn net_code(&self, board: &Path, net_name: &str) -> Result<i32> {
        let nets = self.list_nets(board)?;
        nets.iter()
            .find(|net| net.name == net_name)
            .map(|net| net.code)
            .ok_or_else(|| {
                SvgExtrasError::NetNotFound {
                    net_name: net_name.to_string(),
                }
                .into()
            })
    }

    fn export_args(board: &Path, layers: &[String], theme: Option<&str>, dest: &Path) -> Vec<String> {
        let mut args = vec![
            "pcb".to_string(),
            "export".to_string(),
            "svg".to_string(),
            "--exclude-drawing-sheet".to_string(),
            "--page-size-mode".to_string(),
            "0".to_string(),
            "-l".to_string(),
            layers.join(","),
            "-o".to_string(),
            dest.display().to_string(),
        ];
        if let Some(theme) = theme {
            args.push("--theme".to_string());
            args.push(theme.to_string());
        }
        args.push(board.display().to_string());
        args
    }
}

impl SvgExporter for KicadCliExporter {
    fn list_nets(&self, board: &Path) -> Result<Vec<NetInfo>> {
        let content = fs::read_to_string(board).with_path_context("read", board)?;
        let mut nets: BTreeMap<i32, String> = BTreeMap::new();
        for caps in NET_DECL_RE.captures_iter(&content) {
            let code: i32 = match caps[1].parse() {
                Ok(code) => code,
                Err(_) => continue,
            };
            let name = if caps[2].is_empty() {
                NO_NET.to_string()
            } else {
                caps[2].to_string()
            };
            nets.entry(code).or_insert(name);
        }
        Ok(nets
            .into_iter()
            .map(|(code, name)| NetInfo { code, name })
            .collect())
    }

    fn net_has_elements_on_side(
        &self,
        board: &Path,
        net_name: &str,
        side: BoardSide,
    ) -> Result<bool> {
        let code = self.net_code(board, net_name)?;
        let content = fs::read_to_string(board).with_path_context("read", board)?;
        let copper_layer = format!("\"{}\"", side.copper_layer());

        for (keyword, range) in direct_children(&content) {
            let block = &content[range];
            match keyword.as_str() {
                "segment" | "arc" => {
                    if block_net_code(block) == code && block.contains(&copper_layer) {
                        return Ok(true);
                    }
                }
                // Vias connect both outer layers.
                "via" => {
                    if block_net_code(block) == code {
                        return Ok(true);
                    }
                }
                "zone" => {
                    if block_net_code(block) == code
                        && (block.contains(&copper_layer) || block.contains("\"F&B.Cu\""))
                    {
                        return Ok(true);
                    }
                }
                "footprint" => {
                    for (child, pad_range) in direct_children(block) {
                        if child != "pad" {
                            continue;
                        }
                        let pad = &block[pad_range];
                        if block_net_code(pad) == code
                            && (pad.contains(&copper_layer) || pad.contains("\"*.Cu\""))
                        {
                            return Ok(true);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(false)
    }

    fn write_filtered_board(
        &self,
        board: &Path,
        nets: &[String],
        skip_zones: bool,
        dest: &Path,
    ) -> Result<()> {
        let all_nets = self.list_nets(board)?;
        let mut keep: HashSet<i32> = HashSet::new();
        for name in nets {
            match all_nets.iter().find(|net| net.name == *name) {
                Some(net) => {
                    keep.insert(net.code);
                }
                None => {
                    return Err(SvgExtrasError::NetNotFound {
                        net_name: name.clone(),
                    }
                    .into())
                }
            }
        }

        let content = fs::read_to_string(board).with_path_context("read", board)?;
        let mut output = String::with_capacity(content.len());
        let mut cursor = 0usize;

        for (keyword, range) in direct_children(&content) {
            let block = &content[range.clone()];
            let replacement: Option<String> = match keyword.as_str() {
                "segment" | "arc" | "via" => {
                    if keep.contains(&block_net_code(block)) {
                        continue;
                    }
                    None
                }
                "zone" => {
                    if !skip_zones && keep.contains(&block_net_code(block)) {
                        continue;
                    }
                    None
                }
                "footprint" => filter_footprint_pads(block, &keep),
                _ => continue,
            };

            output.push_str(&content[cursor..range.start]);
            if let Some(text) = replacement {
                output.push_str(&text);
            }
            cursor = range.end;
        }
        output.push_str(&content[cursor..]);

        fs::write(dest, output).with_path_context("write", dest)?;
        Ok(())
    }

    fn export_svg(
        &self,
        board: &Path,
        layers: &[String],
        theme: Option<&str>,
        dest: &Path,
    ) -> Result<()> {
        let args = Self::export_args(board, layers, theme, dest);
        debug!("Running {} {}", self.kicad_cli, args.join(" "));
        let output = Command::new(&self.kicad_cli)
            .args(&args)
            .output()
            .with_context(|| format!("Failed to run '{}', is KiCad installed?", self.kicad_cli))?;
        if !output.status.success() {
            return Err(SvgExtrasError::KicadCliFailed {
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// First `(net N ...)` reference inside a block; elements without one
/// implicitly belong to net 0.
fn block_net_code(block: &str) -> i32 {
    NET_REF_RE
        .captures(block)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// Spans of the direct child forms of an s-expression, with their leading
/// keyword. Quoted strings are honored so parentheses inside names do not
/// unbalance the scan.
fn direct_children(form: &str) -> Vec<(String, Range<usize>)> {
    let mut children = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut child_start = 0usize;

    for (i, byte) in form.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'(' => {
                depth += 1;
                if depth == 2 {
                    child_start = i;
                }
            }
            b')' => {
                if depth == 2 {
                    let block = &form[child_start..=i];
                    children.push((block_keyword(block), child_start..i + 1));
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
    }
    children
}

fn block_keyword(block: &str) -> String {
    block
        .chars()
        .skip(1)
        .take_while(|c| !c.is_whitespace() && *c != '(' && *c != ')')
        .collect()
}

/// Removes pads of foreign nets from a footprint block. Returns `None` when
/// no pad survives, in which case the whole footprint is dropped.
fn filter_footprint_pads(footprint: &str, keep: &HashSet<i32>) -> Option<String> {
    let mut kept_pads = 0usize;
    let mut output = String::with_capacity(footprint.len());
    let mut cursor = 0usize;

    for (keyword, range) in direct_children(footprint) {
        if keyword != "pad" {
            continue;
        }
        if keep.contains(&block_net_code(&footprint[range.clone()])) {
            kept_pads += 1;
            continue;
        }
        output.push_str(&footprint[cursor..range.start]);
        cursor = range.end;
    }
    output.push_str(&footprint[cursor..]);

    if kept_pads == 0 {
        None
    } else {
        Some(output)
    }
}

/// Test exporter that serves canned nets and SVG elements from memory.
///
/// `write_filtered_board` records the selected nets in a small text file;
/// `export_svg` reads it back and emits the registered elements for those
/// nets on the requested layers, inside a fixed-dimension SVG document.
pub struct FixtureExporter {
    nets: Vec<NetInfo>,
    // (net name, layer name) -> element markup; empty net name holds
    // board-level elements such as the outline
    elements: HashMap<(String, String), String>,
    width: String,
    height: String,
    viewbox: String,
}

const FIXTURE_BOARD_HEADER: &str = "fixture-board";

impl Default for FixtureExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureExporter {
    pub fn new() -> Self {
        Self {
            nets: vec![NetInfo {
                code: 0,
                name: NO_NET.to_string(),
            }],
            elements: HashMap::new(),
            width: "29.000200mm".to_string(),
            height: "15.000200mm".to_string(),
            viewbox: "161.9999 78.9999 29.0002 15.0002".to_string(),
        }
    }

    pub fn with_net(mut self, code: i32, name: &str) -> Self {
        self.nets.push(NetInfo {
            code,
            name: name.to_string(),
        });
        self
    }

    /// Registers the markup exported for a net on one layer.
    pub fn with_element(mut self, net: &str, layer: &str, markup: &str) -> Self {
        self.elements
            .insert((net.to_string(), layer.to_string()), markup.to_string());
        self
    }

    /// Registers markup exported whenever the layer is requested, regardless
    /// of net filtering. Used for outline and silkscreen fixtures.
    pub fn with_board_element(mut self, layer: &str, markup: &str) -> Self {
        self.elements
            .insert((String::new(), layer.to_string()), markup.to_string());
        self
    }

    pub fn with_dimensions(mut self, width: &str, height: &str, viewbox: &str) -> Self {
        self.width = width.to_string();
        self.height = height.to_string();
        self.viewbox = viewbox.to_string();
        self
    }

    fn scope_nets(&self, board: &Path) -> Result<Vec<String>> {
        let content = fs::read_to_string(board).with_path_context("read", board)?;
        let mut lines = content.lines();
        if lines.next() == Some(FIXTURE_BOARD_HEADER) {
            Ok(lines
                .filter(|line| !line.is_empty())
                .map(|line| line.to_string())
                .collect())
        } else {
            Ok(self.nets.iter().map(|net| net.name.clone()).collect())
        }
    }
}

impl SvgExporter for FixtureExporter {
    fn list_nets(&self, _board: &Path) -> Result<Vec<NetInfo>> {
        Ok(self.nets.clone())
    }

    fn net_has_elements_on_side(
        &self,
        _board: &Path,
        net_name: &str,
        side: BoardSide,
    ) -> Result<bool> {
        let key = (net_name.to_string(), side.copper_layer().to_string());
        Ok(self.elements.contains_key(&key))
    }

    fn write_filtered_board(
        &self,
        _board: &Path,
        nets: &[String],
        _skip_zones: bool,
        dest: &Path,
    ) -> Result<()> {
        let mut content = String::from(FIXTURE_BOARD_HEADER);
        for net in nets {
            content.push('\n');
            content.push_str(net);
        }
        fs::write(dest, content).with_path_context("write", dest)?;
        Ok(())
    }

    fn export_svg(
        &self,
        board: &Path,
        layers: &[String],
        _theme: Option<&str>,
        dest: &Path,
    ) -> Result<()> {
        let scope = self.scope_nets(board)?;
        let mut body = String::new();
        for layer in layers {
            if let Some(markup) = self.elements.get(&(String::new(), layer.clone())) {
                body.push_str(markup);
                body.push('\n');
            }
            for net in &self.nets {
                if !scope.contains(&net.name) {
                    continue;
                }
                if let Some(markup) = self.elements.get(&(net.name.clone(), layer.clone())) {
                    body.push_str(markup);
                    body.push('\n');
                }
            }
        }

        let svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" version=\"1.1\" width=\"{}\" height=\"{}\" viewBox=\"{}\">\n<title>Fixture export</title>\n<desc>Fixture</desc>\n<g>\n{}</g>\n</svg>",
            self.width, self.height, self.viewbox, body
        );
        fs::write(dest, svg).with_path_context("write", dest)?;
        Ok(())
    }
}
