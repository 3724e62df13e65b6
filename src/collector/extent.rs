/// Detects when scrolling stops producing new content.
///
/// Each cycle reports the content height measured after its scroll and wait.
/// Once `required` consecutive readings are identical the timeline is
/// considered exhausted (or the network has stalled). Any change starts a
/// new run.
#[derive(Debug, Clone)]
pub struct ExtentTracker {
    required: u32,
    last: Option<u64>,
    run: u32,
}

impl ExtentTracker {
    #[must_use]
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            last: None,
            run: 0,
        }
    }

    /// Cycles in a row that saw no growth.
    #[must_use]
    pub fn unchanged_cycles(&self) -> u32 {
        self.run.saturating_sub(1)
    }

    /// Record a reading; `true` once the height has been stable long enough.
    pub fn observe(&mut self, extent: u64) -> bool {
        if self.last == Some(extent) {
            self.run += 1;
        } else {
            self.last = Some(extent);
            self.run = 1;
        }
        self.run >= self.required
    }
}
