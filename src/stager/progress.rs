//! Progress throttling for staging work.

/// Minimum advance, as a fraction of the total, between two emissions.
pub const MIN_STEP: f64 = 0.01;

/// Counts completed units and reports progress only when it has advanced by
/// more than [`MIN_STEP`] since the last report, bounding message volume for
/// inputs with many small files.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    total: u64,
    done: u64,
    last_reported: f64,
}

impl ProgressThrottle {
    /// Create a throttle for `total` units of work.
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            total,
            done: 0,
            last_reported: 0.0,
        }
    }

    /// Record `units` more completed units, returning the new fraction when
    /// it should be reported.
    pub fn advance(&mut self, units: u64) -> Option<f64> {
        if self.total == 0 {
            return None;
        }

        self.done = self.done.saturating_add(units).min(self.total);
        let fraction = ratio(self.done, self.total);

        if fraction - self.last_reported > MIN_STEP {
            self.last_reported = fraction;
            Some(fraction)
        } else {
            None
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(done: u64, total: u64) -> f64 {
    done as f64 / total as f64
}
