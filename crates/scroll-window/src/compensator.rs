use crate::render::ScrollPort;
use tracing::{trace, warn};

/// Scroll offset captured before a layout mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    pub scroll_top: f64,
}

/// A change in the rendered list, with the height that was added or removed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayoutChange {
    /// Unit inserted above the viewport.
    Prepended(f64),
    /// Unit added below the fold; nothing to correct.
    Appended(f64),
    /// Unit removed from above the viewport.
    EvictedFront(f64),
    /// Unit removed below the fold; nothing to correct.
    EvictedBack(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub before: f64,
    pub after: f64,
}

impl Adjustment {
    pub fn delta(&self) -> f64 {
        self.after - self.before
    }
}

/// Keeps the records under the viewport fixed while units are inserted or removed
/// above it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollCompensator;

impl ScrollCompensator {
    pub fn anchor<P: ScrollPort + ?Sized>(&self, port: &P) -> ScrollAnchor {
        ScrollAnchor {
            scroll_top: port.scroll_top(),
        }
    }

    pub fn compensate<P: ScrollPort + ?Sized>(
        &self,
        port: &mut P,
        anchor: ScrollAnchor,
        change: LayoutChange,
    ) -> Adjustment {
        let target = match change {
            LayoutChange::Prepended(height) => anchor.scroll_top + sanitize(height),
            LayoutChange::EvictedFront(height) => anchor.scroll_top - sanitize(height),
            LayoutChange::Appended(_) | LayoutChange::EvictedBack(_) => {
                return Adjustment {
                    before: anchor.scroll_top,
                    after: port.scroll_top(),
                };
            }
        };
        port.set_scroll_top(target);
        let after = port.scroll_top();
        trace!(
            target = "scroll_window::compensator",
            ?change,
            before = anchor.scroll_top,
            after,
            "scroll compensated"
        );
        Adjustment {
            before: anchor.scroll_top,
            after,
        }
    }
}

fn sanitize(height: f64) -> f64 {
    if height.is_finite() && height >= 0.0 {
        height
    } else {
        warn!(
            target = "scroll_window::compensator",
            height, "render adapter reported an unusable height; treating as zero"
        );
        0.0
    }
}
