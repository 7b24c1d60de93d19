/// Single-flight guard for one window.
///
/// A denied `try_begin` is not queued: the fetch already in flight re-runs the
/// check when it completes, so no demand is lost.
#[derive(Debug, Default)]
pub struct FetchGate {
    pending: bool,
    busy_skips: u64,
}

impl FetchGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&mut self) -> bool {
        if self.pending {
            self.busy_skips = self.busy_skips.saturating_add(1);
            return false;
        }
        self.pending = true;
        true
    }

    pub fn end(&mut self) {
        self.pending = false;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Triggers dropped because a fetch was already outstanding.
    pub fn busy_skips(&self) -> u64 {
        self.busy_skips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_denied_until_end() {
        let mut gate = FetchGate::new();
        assert!(gate.try_begin());
        assert!(gate.is_pending());
        assert!(!gate.try_begin());
        assert!(!gate.try_begin());
        assert_eq!(gate.busy_skips(), 2);

        gate.end();
        assert!(!gate.is_pending());
        assert!(gate.try_begin());
    }

    #[test]
    fn end_is_unconditional() {
        let mut gate = FetchGate::new();
        gate.end();
        assert!(!gate.is_pending());
        assert!(gate.try_begin());
    }
}
