use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefaults {
    pub leaf_width: f32,
    pub leaf_height: f32,
    pub group_width: f32,
    pub group_height: f32,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            leaf_width: 96.0,
            leaf_height: 96.0,
            group_width: 288.0,
            group_height: 192.0,
        }
    }
}

/// Orthogonal router tuning. Penalties are in units of one grid cell of
/// travel, so `bend_penalty: 2.0` makes a turn cost as much as two cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub grid_cell: f32,
    pub obstacle_padding: f32,
    /// Straight run out of a port before the first bend. `0` derives it from
    /// padding and cell size.
    pub stub_length: f32,
    pub port_spacing: f32,
    pub bend_penalty: f32,
    pub segment_penalty: f32,
    pub crossing_penalty: f32,
    pub shared_path_penalty: f32,
    pub max_steps: usize,
    pub max_grid_cells: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            grid_cell: 10.0,
            obstacle_padding: 8.0,
            stub_length: 0.0,
            port_spacing: 12.0,
            bend_penalty: 2.0,
            segment_penalty: 0.5,
            crossing_penalty: 4.0,
            shared_path_penalty: 3.0,
            max_steps: 200_000,
            max_grid_cells: 250_000,
        }
    }
}

/// Bounds for `max_grid_cells`. The upper one keeps per-edge search state
/// (four headings per cell) addressable with `i32` cell coordinates.
pub const MIN_GRID_CELLS: usize = 64;
pub const MAX_GRID_CELLS: usize = 16_000_000;

impl RouterConfig {
    pub fn cell_size(&self) -> f32 {
        self.grid_cell.max(2.0)
    }

    pub fn grid_cell_limit(&self) -> usize {
        self.max_grid_cells.clamp(MIN_GRID_CELLS, MAX_GRID_CELLS)
    }

    /// Never less than half a cell plus a pixel, otherwise a single grid step
    /// could hop across a thin obstacle.
    pub fn effective_padding(&self) -> f32 {
        self.obstacle_padding.max(self.cell_size() / 2.0 + 1.0)
    }

    pub fn effective_stub_length(&self) -> f32 {
        if self.stub_length > 0.0 {
            self.stub_length.max(self.effective_padding() + 1.0)
        } else {
            self.effective_padding() + self.cell_size()
        }
    }

    /// Stable across runs; feeds the routing epoch.
    pub fn fingerprint<H: Hasher>(&self, state: &mut H) {
        for value in [
            self.grid_cell,
            self.obstacle_padding,
            self.stub_length,
            self.port_spacing,
            self.bend_penalty,
            self.segment_penalty,
            self.crossing_penalty,
            self.shared_path_penalty,
        ] {
            value.to_bits().hash(state);
        }
        self.max_steps.hash(state);
        self.max_grid_cells.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditorConfig {
    pub defaults: NodeDefaults,
    pub router: RouterConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeDefaultsFile {
    leaf_width: Option<f32>,
    leaf_height: Option<f32>,
    group_width: Option<f32>,
    group_height: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouterConfigFile {
    grid_cell: Option<f32>,
    obstacle_padding: Option<f32>,
    stub_length: Option<f32>,
    port_spacing: Option<f32>,
    bend_penalty: Option<f32>,
    segment_penalty: Option<f32>,
    crossing_penalty: Option<f32>,
    shared_path_penalty: Option<f32>,
    max_steps: Option<usize>,
    max_grid_cells: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    defaults: Option<NodeDefaultsFile>,
    router: Option<RouterConfigFile>,
}

pub fn parse_config(contents: &str, json5: bool) -> anyhow::Result<EditorConfig> {
    let parsed: ConfigFile = if json5 {
        json5::from_str(contents)?
    } else {
        serde_json::from_str(contents)?
    };
    let mut config = EditorConfig::default();

    if let Some(defaults) = parsed.defaults {
        if let Some(v) = defaults.leaf_width {
            config.defaults.leaf_width = v;
        }
        if let Some(v) = defaults.leaf_height {
            config.defaults.leaf_height = v;
        }
        if let Some(v) = defaults.group_width {
            config.defaults.group_width = v;
        }
        if let Some(v) = defaults.group_height {
            config.defaults.group_height = v;
        }
    }

    if let Some(router) = parsed.router {
        if let Some(v) = router.grid_cell {
            config.router.grid_cell = v;
        }
        if let Some(v) = router.obstacle_padding {
            config.router.obstacle_padding = v;
        }
        if let Some(v) = router.stub_length {
            config.router.stub_length = v;
        }
        if let Some(v) = router.port_spacing {
            config.router.port_spacing = v;
        }
        if let Some(v) = router.bend_penalty {
            config.router.bend_penalty = v;
        }
        if let Some(v) = router.segment_penalty {
            config.router.segment_penalty = v;
        }
        if let Some(v) = router.crossing_penalty {
            config.router.crossing_penalty = v;
        }
        if let Some(v) = router.shared_path_penalty {
            config.router.shared_path_penalty = v;
        }
        if let Some(v) = router.max_steps {
            config.router.max_steps = v;
        }
        if let Some(v) = router.max_grid_cells {
            config.router.max_grid_cells = v.clamp(MIN_GRID_CELLS, MAX_GRID_CELLS);
        }
    }

    let d = &config.defaults;
    if [d.leaf_width, d.leaf_height, d.group_width, d.group_height]
        .iter()
        .any(|v| !v.is_finite() || *v <= 0.0)
    {
        anyhow::bail!("default node sizes must be positive");
    }

    Ok(config)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<EditorConfig> {
    let Some(path) = path else {
        return Ok(EditorConfig::default());
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let is_json5 = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json5"))
        .unwrap_or(false);
    parse_config(&contents, is_json5).with_context(|| format!("parsing config {}", path.display()))
}
