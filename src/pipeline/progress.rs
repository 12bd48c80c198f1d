//! Progress reporting for patch runs.
//!
//! The orchestrator reports discrete named stages with a monotonically
//! increasing completion percentage to an injected [`ProgressSink`]. The sink
//! is a collaborator supplied by the embedding application — an installer UI,
//! a CLI, a test — and is deliberately not part of the engine itself.

/// Receives stage transitions of a patch run.
pub trait ProgressSink {
    /// Called when a run enters a named stage.
    ///
    /// `percent` increases monotonically over the lifetime of one run and
    /// reaches 100 exactly once, on success.
    fn report(&self, percent: u8, stage: &str);
}

/// A sink that discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _percent: u8, _stage: &str) {}
}

/// A sink that routes stages through the `log` crate at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, percent: u8, stage: &str) {
        log::info!("[{percent:3}%] {stage}");
    }
}

/// Forwards to an inner sink, compressing one pass into a percentage window.
///
/// Used by the two-pass driver so that pass one spans 0–50 and pass two
/// 50–100 of the overall run.
pub(crate) struct ScaledProgress<'a> {
    inner: &'a dyn ProgressSink,
    base: u8,
    prefix: &'static str,
}

impl<'a> ScaledProgress<'a> {
    pub(crate) fn new(inner: &'a dyn ProgressSink, base: u8, prefix: &'static str) -> Self {
        ScaledProgress { inner, base, prefix }
    }
}

impl ProgressSink for ScaledProgress<'_> {
    fn report(&self, percent: u8, stage: &str) {
        self.inner
            .report(self.base + percent / 2, &format!("{}: {}", self.prefix, stage));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recording(RefCell<Vec<(u8, String)>>);

    impl ProgressSink for Recording {
        fn report(&self, percent: u8, stage: &str) {
            self.0.borrow_mut().push((percent, stage.to_string()));
        }
    }

    #[test]
    fn scaled_progress_compresses_into_window() {
        let recording = Recording(RefCell::new(Vec::new()));
        let scaled = ScaledProgress::new(&recording, 50, "pass two");
        scaled.report(0, "merging modules");
        scaled.report(100, "pass complete");

        let events = recording.0.borrow();
        assert_eq!(events[0], (50, "pass two: merging modules".to_string()));
        assert_eq!(events[1], (100, "pass two: pass complete".to_string()));
    }
}
