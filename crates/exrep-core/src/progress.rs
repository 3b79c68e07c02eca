//! Progress reporting hooks for long-running batch stages.

/// Stage of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Upload,
    Submit,
    Poll,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Submit => "submit",
            Stage::Poll => "poll",
        }
    }
}

/// Receives progress notifications. Every method defaults to doing nothing.
pub trait ProgressObserver: Send + Sync {
    fn stage_started(&self, _stage: Stage, _total: usize) {}

    fn item_finished(&self, _stage: Stage) {}

    fn stage_finished(&self, _stage: Stage) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}
