use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::config::{MAX_GRID_CELLS, MIN_GRID_CELLS, RouterConfig};
use crate::geometry::{Geometry, Point};

use super::ports::Side;

/// Integer cost multiplier so A* can use u32 costs with fractional cell sizes.
const ASTAR_COST_SCALE: f32 = 1000.0;
/// Occupancy samples per segment are capped; long segments are strided.
const OCCUPANCY_MAX_SAMPLES: usize = 32;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolveError {
    #[error("search window is empty or not finite")]
    EmptyGrid,
    #[error("port lies outside the routing grid")]
    OutsideGrid,
    #[error("search gave up after {steps} steps")]
    SearchExhausted { steps: usize },
    #[error("no obstacle-free path between the ports")]
    NoPath,
    #[error("route has non-finite coordinates")]
    NonFinite,
}

/// Router penalties converted to scaled integer costs for one cell size.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    pub cell: f32,
    pub step: u32,
    pub bend: u32,
    pub crossing: u32,
    pub shared: u32,
}

impl CostModel {
    pub fn from_config(config: &RouterConfig) -> Self {
        let cell = config.cell_size();
        let scaled = |units: f32| (units.max(0.0) * cell * ASTAR_COST_SCALE).round() as u32;
        Self {
            cell,
            step: scaled(1.0),
            bend: scaled(config.bend_penalty + config.segment_penalty),
            crossing: scaled(config.crossing_penalty),
            shared: scaled(config.shared_path_penalty),
        }
    }

    /// Cost of travelling `length` px in a straight line.
    pub fn travel(&self, length: f32) -> u32 {
        (length / self.cell * self.step as f32).round() as u32
    }
}

/// Cells already used by routed edges, tracked per axis so a perpendicular
/// crossing and a parallel overlap can be priced differently.
#[derive(Debug, Clone)]
pub struct EdgeOccupancy {
    cell: f32,
    horizontal: FxHashMap<(i32, i32), u16>,
    vertical: FxHashMap<(i32, i32), u16>,
}

impl EdgeOccupancy {
    pub fn new(cell: f32) -> Self {
        Self {
            cell: cell.max(2.0),
            horizontal: FxHashMap::default(),
            vertical: FxHashMap::default(),
        }
    }

    fn cell_index(&self, p: Point) -> (i32, i32) {
        (
            (p.x / self.cell).floor() as i32,
            (p.y / self.cell).floor() as i32,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.horizontal.is_empty() && self.vertical.is_empty()
    }

    pub fn add_path(&mut self, points: &[Point]) {
        for segment in points.windows(2) {
            let (a, b) = (segment[0], segment[1]);
            let horizontal = (b.x - a.x).abs() >= (b.y - a.y).abs();
            let samples = self.samples(a, b, false);
            let weights = if horizontal {
                &mut self.horizontal
            } else {
                &mut self.vertical
            };
            for (ix, iy) in samples {
                let entry = weights.entry((ix, iy)).or_insert(0);
                *entry = entry.saturating_add(2);
                let sides = if horizontal {
                    [(ix, iy - 1), (ix, iy + 1)]
                } else {
                    [(ix - 1, iy), (ix + 1, iy)]
                };
                for idx in sides {
                    let entry = weights.entry(idx).or_insert(0);
                    *entry = entry.saturating_add(1);
                }
            }
        }
    }

    fn samples(&self, a: Point, b: Point, strided: bool) -> Vec<(i32, i32)> {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let len = (dx * dx + dy * dy).sqrt();
        let steps = ((len / self.cell).ceil() as usize).max(1);
        let stride = if strided && steps > OCCUPANCY_MAX_SAMPLES {
            (steps / OCCUPANCY_MAX_SAMPLES).max(1)
        } else {
            1
        };
        let mut out: Vec<(i32, i32)> = Vec::with_capacity(steps + 1);
        for i in (0..=steps).step_by(stride) {
            let t = i as f32 / steps as f32;
            let idx = self.cell_index(Point::new(a.x + dx * t, a.y + dy * t));
            if out.last() != Some(&idx) {
                out.push(idx);
            }
        }
        out
    }

    /// Penalty for entering the cell at `p` while travelling along one axis.
    pub fn entering_cost(&self, p: Point, horizontal: bool, costs: &CostModel) -> u32 {
        let idx = self.cell_index(p);
        let h = self.horizontal.get(&idx).copied().unwrap_or(0) as u32;
        let v = self.vertical.get(&idx).copied().unwrap_or(0) as u32;
        let (same, cross) = if horizontal { (h, v) } else { (v, h) };
        let mut cost = same.saturating_mul(costs.shared) / 2;
        if cross >= 2 {
            cost = cost.saturating_add(costs.crossing);
        }
        cost
    }

    /// Occupancy penalty along an already-built polyline.
    pub fn score_path(&self, points: &[Point], costs: &CostModel) -> u32 {
        let mut score = 0u32;
        for segment in points.windows(2) {
            let (a, b) = (segment[0], segment[1]);
            let horizontal = (b.x - a.x).abs() >= (b.y - a.y).abs();
            for (ix, iy) in self.samples(a, b, true) {
                let p = Point::new(
                    (ix as f32 + 0.5) * self.cell,
                    (iy as f32 + 0.5) * self.cell,
                );
                score = score.saturating_add(self.entering_cost(p, horizontal, costs));
            }
        }
        score
    }
}

/// Search area for one edge: the box spanning both stub points, grown to
/// cover every obstacle it touches, plus `margin` on each side.
pub fn search_window(rects: &[Geometry], start: Point, end: Point, margin: f32) -> Geometry {
    let mut window = Geometry::spanning(start, end);
    for rect in rects {
        if rect.overlaps(&window) {
            window = window.union(rect);
        }
    }
    window.inflate(margin)
}

fn grid_dims(window: &Geometry, cell: f32) -> (usize, usize) {
    let cols = (window.w / cell).ceil() as usize + 1;
    let rows = (window.h / cell).ceil() as usize + 1;
    (cols, rows)
}

/// Uniform grid over one search window, with each cell listing the (padded)
/// obstacles that overlap it.
#[derive(Debug, Clone)]
pub struct RoutingGrid<'a> {
    cell: f32,
    min_x: f32,
    min_y: f32,
    cols: i32,
    rows: i32,
    rects: &'a [Geometry],
    cell_obstacles: Vec<Vec<usize>>,
}

impl<'a> RoutingGrid<'a> {
    /// `rects` must already carry the obstacle padding; their indices are
    /// what [`SearchQuery::blocks`] is asked about. Only rects overlapping
    /// `window` are rasterised. When the window would need more than
    /// `max_cells` cells the cell size grows until it fits.
    pub fn new(rects: &'a [Geometry], window: Geometry, cell: f32, max_cells: usize) -> Result<Self, SolveError> {
        if !window.is_valid() {
            return Err(SolveError::EmptyGrid);
        }
        let max_cells = max_cells.clamp(MIN_GRID_CELLS, MAX_GRID_CELLS);
        let mut cell = cell.max(2.0);
        let (mut cols, mut rows) = grid_dims(&window, cell);
        if cols.saturating_mul(rows) > max_cells {
            cell *= (cols as f32 * rows as f32 / max_cells as f32).sqrt();
            (cols, rows) = grid_dims(&window, cell);
            while cols.saturating_mul(rows) > max_cells {
                cell *= 1.1;
                (cols, rows) = grid_dims(&window, cell);
            }
        }
        let total_cells = cols * rows;
        let (cols, rows) = (cols as i32, rows as i32);
        let (min_x, min_y) = (window.x, window.y);
        let mut cell_obstacles = vec![Vec::new(); total_cells];
        for (idx, rect) in rects.iter().enumerate() {
            if !rect.overlaps(&window) {
                continue;
            }
            let start_x = ((rect.x - min_x) / cell).floor().max(0.0) as i32;
            let end_x = ((rect.right() - min_x) / cell)
                .floor()
                .min((cols - 1) as f32) as i32;
            let start_y = ((rect.y - min_y) / cell).floor().max(0.0) as i32;
            let end_y = ((rect.bottom() - min_y) / cell)
                .floor()
                .min((rows - 1) as f32) as i32;
            for iy in start_y..=end_y {
                for ix in start_x..=end_x {
                    cell_obstacles[(iy * cols + ix) as usize].push(idx);
                }
            }
        }
        Ok(Self {
            cell,
            min_x,
            min_y,
            cols,
            rows,
            rects,
            cell_obstacles,
        })
    }

    pub fn cell_size(&self) -> f32 {
        self.cell
    }

    pub fn cell_count(&self) -> usize {
        self.cell_obstacles.len()
    }

    fn index(&self, ix: i32, iy: i32) -> usize {
        (iy * self.cols + ix) as usize
    }

    fn cell_for_point(&self, p: Point) -> Option<(i32, i32)> {
        let ix = ((p.x - self.min_x) / self.cell).floor() as i32;
        let iy = ((p.y - self.min_y) / self.cell).floor() as i32;
        if ix < 0 || iy < 0 || ix >= self.cols || iy >= self.rows {
            return None;
        }
        Some((ix, iy))
    }

    fn cell_center(&self, ix: i32, iy: i32) -> Point {
        Point::new(
            self.min_x + (ix as f32 + 0.5) * self.cell,
            self.min_y + (iy as f32 + 0.5) * self.cell,
        )
    }

    fn cell_blocked(&self, ix: i32, iy: i32, query: &SearchQuery<'_>) -> bool {
        let center = self.cell_center(ix, iy);
        self.cell_obstacles[self.index(ix, iy)]
            .iter()
            .any(|&idx| (query.blocks)(idx) && self.rects[idx].contains(center))
    }

    /// A* from the start stub to the end stub. Returns the polyline between
    /// the two stub points, junctions included.
    pub fn search(
        &self,
        query: &SearchQuery<'_>,
        occupancy: &EdgeOccupancy,
        costs: &CostModel,
        max_steps: usize,
    ) -> Result<Vec<Point>, SolveError> {
        let start = query.start;
        let end = query.end;
        let (start_ix, start_iy) = self.cell_for_point(start).ok_or(SolveError::OutsideGrid)?;
        let (end_ix, end_iy) = self.cell_for_point(end).ok_or(SolveError::OutsideGrid)?;
        if start_ix == end_ix && start_iy == end_iy {
            return Ok(vec![start, end]);
        }

        let start_dir = heading(query.start_side.outward());
        let (ox, oy) = query.end_side.outward();
        let end_dir = heading((-ox, -oy));

        let cols = self.cols;
        let rows = self.rows;
        let states = self.cell_obstacles.len() * 4;
        let mut best_cost = vec![u32::MAX; states];
        let mut prev: Vec<Option<GridState>> = vec![None; states];
        let mut heap = BinaryHeap::new();

        for dir in 0..4u8 {
            let cost = if dir == start_dir { 0 } else { costs.bend };
            let idx = ((start_iy * cols + start_ix) as usize) * 4 + dir as usize;
            best_cost[idx] = cost;
            heap.push(GridEntry {
                est: cost,
                cost,
                state: GridState {
                    x: start_ix,
                    y: start_iy,
                    dir,
                },
            });
        }

        let mut end_state: Option<GridState> = None;
        let mut steps = 0usize;

        while let Some(entry) = heap.pop() {
            steps += 1;
            if steps > max_steps {
                return Err(SolveError::SearchExhausted { steps: max_steps });
            }
            let GridEntry { cost, state, .. } = entry;
            let state_idx = ((state.y * cols + state.x) as usize) * 4 + state.dir as usize;
            if cost != best_cost[state_idx] {
                continue;
            }
            if state.x == end_ix && state.y == end_iy {
                end_state = Some(state);
                break;
            }
            for (dir_idx, (dx, dy)) in DIRS.iter().enumerate() {
                let nx = state.x + dx;
                let ny = state.y + dy;
                if nx < 0 || ny < 0 || nx >= cols || ny >= rows {
                    continue;
                }
                let at_end = nx == end_ix && ny == end_iy;
                if !at_end
                    && (nx != start_ix || ny != start_iy)
                    && self.cell_blocked(nx, ny, query)
                {
                    continue;
                }
                let dir = dir_idx as u8;
                let mut next_cost = cost.saturating_add(costs.step);
                if state.dir != dir {
                    next_cost = next_cost.saturating_add(costs.bend);
                }
                if at_end && dir != end_dir {
                    next_cost = next_cost.saturating_add(costs.bend);
                }
                let horizontal = *dy == 0;
                next_cost = next_cost.saturating_add(occupancy.entering_cost(
                    self.cell_center(nx, ny),
                    horizontal,
                    costs,
                ));
                let next_idx = ((ny * cols + nx) as usize) * 4 + dir_idx;
                if next_cost >= best_cost[next_idx] {
                    continue;
                }
                best_cost[next_idx] = next_cost;
                prev[next_idx] = Some(state);
                let manhattan = (nx - end_ix).unsigned_abs() + (ny - end_iy).unsigned_abs();
                let est = next_cost.saturating_add(manhattan.saturating_mul(costs.step));
                heap.push(GridEntry {
                    est,
                    cost: next_cost,
                    state: GridState { x: nx, y: ny, dir },
                });
            }
        }

        let end_state = end_state.ok_or(SolveError::NoPath)?;
        let mut cells: Vec<(i32, i32)> = Vec::new();
        let mut cur = end_state;
        loop {
            cells.push((cur.x, cur.y));
            let cur_idx = ((cur.y * cols + cur.x) as usize) * 4 + cur.dir as usize;
            match prev[cur_idx] {
                Some(prev_state) => cur = prev_state,
                None => break,
            }
        }
        cells.reverse();

        let mut points: Vec<Point> = Vec::with_capacity(cells.len() + 4);
        points.push(start);
        if let Some(&(ix, iy)) = cells.first() {
            let c = self.cell_center(ix, iy);
            if query.start_side.is_vertical() {
                points.push(Point::new(c.x, start.y));
            } else {
                points.push(Point::new(start.x, c.y));
            }
            points.push(c);
        }
        for &(ix, iy) in cells.iter().skip(1) {
            points.push(self.cell_center(ix, iy));
        }
        if let Some(&(ix, iy)) = cells.last() {
            let c = self.cell_center(ix, iy);
            if query.end_side.is_vertical() {
                points.push(Point::new(c.x, end.y));
            } else {
                points.push(Point::new(end.x, c.y));
            }
        }
        points.push(end);
        Ok(points)
    }
}

/// Up, down, left, right.
const DIRS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

fn heading(vector: (f32, f32)) -> u8 {
    match vector {
        (x, _) if x < 0.0 => 2,
        (x, _) if x > 0.0 => 3,
        (_, y) if y < 0.0 => 0,
        _ => 1,
    }
}

/// One grid search: endpoints, their sides, and which obstacle indices may
/// not be entered.
pub struct SearchQuery<'a> {
    pub start: Point,
    pub start_side: Side,
    pub end: Point,
    pub end_side: Side,
    pub blocks: &'a dyn Fn(usize) -> bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct GridState {
    x: i32,
    y: i32,
    dir: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct GridEntry {
    est: u32,
    cost: u32,
    state: GridState,
}

impl Ord for GridEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .est
            .cmp(&self.est)
            .then_with(|| other.cost.cmp(&self.cost))
            .then_with(|| self.state.y.cmp(&other.state.y))
            .then_with(|| self.state.x.cmp(&other.state.x))
            .then_with(|| self.state.dir.cmp(&other.state.dir))
    }
}

impl PartialOrd for GridEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
