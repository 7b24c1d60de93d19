use crate::chunk::Chunk;
use crate::record::{Edge, Record};
use crate::viewport::Geometry;
use std::collections::VecDeque;

/// Presentation-side hook that turns chunks into renderable units.
pub trait RenderAdapter {
    /// Renders `chunk` at `edge` and returns the unit's height once attached.
    fn attach(&mut self, edge: Edge, chunk: &Chunk) -> f64;

    /// Removes the unit at `edge`.
    fn detach(&mut self, edge: Edge);
}

/// Scroll position and container geometry of the host viewport.
pub trait ScrollPort {
    fn geometry(&self) -> Geometry;
    fn scroll_top(&self) -> f64;
    fn set_scroll_top(&mut self, top: f64);
}

/// Everything the controller needs from the presentation layer.
pub trait Surface: RenderAdapter + ScrollPort {}

impl<T: RenderAdapter + ScrollPort + ?Sized> Surface for T {}

#[derive(Debug, Clone)]
struct RenderedUnit {
    lines: Vec<String>,
    height: f64,
}

/// In-memory surface with a fixed height per record and a document-style scroll
/// that clamps to the rendered content. Used by the simulator and tests.
#[derive(Debug, Clone)]
pub struct SimulatedSurface {
    row_height: f64,
    container_top: f64,
    viewport_height: f64,
    scroll_top: f64,
    units: VecDeque<RenderedUnit>,
}

impl SimulatedSurface {
    pub fn new(row_height: f64, viewport_height: f64) -> Self {
        Self {
            row_height: row_height.max(0.0),
            container_top: 0.0,
            viewport_height: viewport_height.max(0.0),
            scroll_top: 0.0,
            units: VecDeque::new(),
        }
    }

    /// Space above the list (headers and the like), in document units.
    pub fn with_container_top(mut self, container_top: f64) -> Self {
        self.container_top = container_top.max(0.0);
        self
    }

    pub fn render_line(record: &Record) -> String {
        format!("{} #{}", record.source, record.offset)
    }

    pub fn container_height(&self) -> f64 {
        self.units.iter().map(|unit| unit.height).sum()
    }

    pub fn document_height(&self) -> f64 {
        self.container_top + self.container_height()
    }

    pub fn max_scroll(&self) -> f64 {
        (self.document_height() - self.viewport_height).max(0.0)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    pub fn scroll_by(&mut self, delta: f64) {
        self.set_scroll_top(self.scroll_top + delta);
    }

    pub fn resize(&mut self, viewport_height: f64) {
        self.viewport_height = viewport_height.max(0.0);
        self.set_scroll_top(self.scroll_top);
    }

    /// Lines whose rows intersect the visible frame, top to bottom.
    pub fn visible_lines(&self) -> Vec<String> {
        let view_top = self.scroll_top;
        let view_bottom = self.scroll_top + self.viewport_height;
        let mut y = self.container_top;
        let mut out = Vec::new();
        for unit in &self.units {
            let row = if unit.lines.is_empty() {
                0.0
            } else {
                unit.height / unit.lines.len() as f64
            };
            for line in &unit.lines {
                if y + row > view_top && y < view_bottom {
                    out.push(line.clone());
                }
                y += row;
            }
        }
        out
    }
}

impl RenderAdapter for SimulatedSurface {
    fn attach(&mut self, edge: Edge, chunk: &Chunk) -> f64 {
        let lines: Vec<String> = chunk.records().iter().map(Self::render_line).collect();
        let height = lines.len() as f64 * self.row_height;
        let unit = RenderedUnit { lines, height };
        match edge {
            Edge::Top => self.units.push_front(unit),
            Edge::Bottom => self.units.push_back(unit),
        }
        height
    }

    fn detach(&mut self, edge: Edge) {
        match edge {
            Edge::Top => self.units.pop_front(),
            Edge::Bottom => self.units.pop_back(),
        };
        self.set_scroll_top(self.scroll_top);
    }
}

impl ScrollPort for SimulatedSurface {
    fn geometry(&self) -> Geometry {
        Geometry {
            viewport_top: self.scroll_top,
            viewport_height: self.viewport_height,
            container_top: self.container_top,
            container_height: self.container_height(),
        }
    }

    fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    fn set_scroll_top(&mut self, top: f64) {
        self.scroll_top = top.clamp(0.0, self.max_scroll());
    }
}
