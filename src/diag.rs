use log::{debug, info, warn};
use rustc_hash::FxHashSet;

/// One-time diagnostic conditions, deduplicated per capturer instance.
/// Two capturers in one process each report independently; dropping a
/// capturer forgets its history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum DiagCategory {
    /// HDR-precision duplication formats were refused and the session
    /// fell back to plain `DuplicateOutput`.
    DuplicationFormatFallback,
    /// HDR was assumed from reported luminance alone, without a PQ
    /// color space.
    HdrLuminanceHeuristic,
    /// The duplication path was abandoned for GDI.
    GdiFallbackEngaged,
}

pub(crate) struct DiagLog {
    debug_mode: bool,
    reported: FxHashSet<DiagCategory>,
}

impl DiagLog {
    pub(crate) fn new(debug_mode: bool) -> Self {
        Self {
            debug_mode,
            reported: FxHashSet::default(),
        }
    }

    pub(crate) fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Emit a warning for `category` the first time it is reported on
    /// this instance. Returns whether the message was emitted.
    pub(crate) fn warn_once(
        &mut self,
        category: DiagCategory,
        message: impl FnOnce() -> String,
    ) -> bool {
        if !self.reported.insert(category) {
            return false;
        }
        warn!("{}", message());
        true
    }

    /// Per-capture diagnostics. Emitted at info level in debug mode so
    /// they show up under default filters, at debug level otherwise.
    pub(crate) fn capture_detail(&self, message: impl FnOnce() -> String) {
        if self.debug_mode {
            info!("{}", message());
        } else {
            debug!("{}", message());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_report_of_a_category_is_suppressed() {
        let mut diag = DiagLog::new(false);
        assert!(diag.warn_once(DiagCategory::GdiFallbackEngaged, || "fallback".into()));
        assert!(!diag.warn_once(DiagCategory::GdiFallbackEngaged, || "fallback".into()));
    }

    #[test]
    fn categories_are_tracked_independently() {
        let mut diag = DiagLog::new(true);
        assert!(diag.warn_once(DiagCategory::DuplicationFormatFallback, || "a".into()));
        assert!(diag.warn_once(DiagCategory::HdrLuminanceHeuristic, || "b".into()));
        assert!(!diag.warn_once(DiagCategory::DuplicationFormatFallback, || "a".into()));
    }

    #[test]
    fn separate_instances_do_not_share_history() {
        let mut first = DiagLog::new(false);
        let mut second = DiagLog::new(false);
        assert!(first.warn_once(DiagCategory::GdiFallbackEngaged, || "x".into()));
        assert!(second.warn_once(DiagCategory::GdiFallbackEngaged, || "x".into()));
    }
}
