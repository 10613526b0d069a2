use log::{log_enabled, Level};
use std::time::Instant;

/// Scoped timer that traces how long a pipeline phase took.
pub struct PhaseTimer<'a> {
    label: &'a str,
    start: Instant,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for PhaseTimer<'a> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            log::trace!("{} took {} µs", self.label, self.start.elapsed().as_micros());
        }
    }
}
