use serde::Serialize;

pub const DEFAULT_TOP_BUFFER: f64 = 500.0;
pub const DEFAULT_BOTTOM_BUFFER: f64 = 200.0;

/// Document-space geometry of the visible frame and the list container.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Geometry {
    pub viewport_top: f64,
    pub viewport_height: f64,
    pub container_top: f64,
    pub container_height: f64,
}

impl Geometry {
    pub fn viewport_bottom(&self) -> f64 {
        self.viewport_top + self.viewport_height
    }

    /// Container bottom rounded down to whole units.
    pub fn container_bottom(&self) -> f64 {
        (self.container_top + self.container_height).floor()
    }
}

/// Which ends of the container are close enough to the visible frame to load more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Needs {
    pub top: bool,
    pub bottom: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMonitor {
    top_buffer: f64,
    bottom_buffer: f64,
}

impl Default for ViewportMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_BUFFER, DEFAULT_BOTTOM_BUFFER)
    }
}

impl ViewportMonitor {
    pub fn new(top_buffer: f64, bottom_buffer: f64) -> Self {
        Self {
            top_buffer,
            bottom_buffer,
        }
    }

    pub fn needs_more(&self, geometry: &Geometry) -> Needs {
        Needs {
            top: geometry.container_top + self.top_buffer >= geometry.viewport_top,
            bottom: geometry.container_bottom() - self.bottom_buffer
                <= geometry.viewport_bottom(),
        }
    }
}
