use chrono::{DateTime, Utc};

/// What the cutoff makes of one newly seen post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffVerdict {
    /// Not older than the cutoff; the stale streak is reset.
    Fresh,
    /// Older than the cutoff; not collected.
    Stale,
    /// Older than the cutoff and the streak just hit the limit.
    Stop,
    /// The timestamp could not be read; collected, streak untouched.
    Undated,
}

/// Date-cutoff stopping rule.
///
/// One old post is not enough to stop: pinned posts sit at the top of a
/// profile regardless of age. Collection stops once `limit` old posts are
/// seen in a row, and the stop latch never reopens.
#[derive(Debug, Clone)]
pub struct CutoffState {
    cutoff: DateTime<Utc>,
    limit: u32,
    consecutive_old: u32,
    stopped: bool,
}

impl CutoffState {
    #[must_use]
    pub fn new(cutoff: DateTime<Utc>, limit: u32) -> Self {
        Self {
            cutoff,
            limit: limit.max(1),
            consecutive_old: 0,
            stopped: false,
        }
    }

    #[must_use]
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    #[must_use]
    pub fn consecutive_old(&self) -> u32 {
        self.consecutive_old
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Judge a post by its timestamp.
    pub fn observe(&mut self, date: &str) -> CutoffVerdict {
        if self.stopped {
            return CutoffVerdict::Stop;
        }
        let Ok(posted) = DateTime::parse_from_rfc3339(date) else {
            return CutoffVerdict::Undated;
        };

        if posted.with_timezone(&Utc) < self.cutoff {
            self.consecutive_old += 1;
            if self.consecutive_old >= self.limit {
                self.stopped = true;
                CutoffVerdict::Stop
            } else {
                CutoffVerdict::Stale
            }
        } else {
            self.consecutive_old = 0;
            CutoffVerdict::Fresh
        }
    }
}
