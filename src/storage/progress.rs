use super::UploadProgress;

/// Displayed upload progress.
///
/// The latest tick is taken as current unless it would move the displayed
/// percentage backwards; such regressions (late or reordered ticks) are
/// dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressTracker {
    current: Option<UploadProgress>,
}

impl ProgressTracker {
    /// Returns true when the displayed value changed.
    pub fn observe(&mut self, tick: UploadProgress) -> bool {
        match self.current {
            Some(current) if tick.percentage < current.percentage => false,
            Some(current) if tick == current => false,
            _ => {
                self.current = Some(tick);
                true
            }
        }
    }

    pub fn current(&self) -> Option<UploadProgress> {
        self.current
    }

    pub fn percentage(&self) -> Option<u8> {
        self.current.map(|p| p.percentage)
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}
