//! Progress hook invoked around stage bodies.

/// Lifecycle point of a stage body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagePhase {
    Started,
    Finished,
    Failed,
}

impl StagePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StagePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives stage lifecycle events; how they are displayed is up to the caller.
///
/// Any `Fn(Option<&str>, StagePhase)` closure is a reporter.
pub trait StageReporter: Send + Sync {
    fn stage(&self, description: Option<&str>, phase: StagePhase);
}

impl<F> StageReporter for F
where
    F: Fn(Option<&str>, StagePhase) + Send + Sync,
{
    fn stage(&self, description: Option<&str>, phase: StagePhase) {
        self(description, phase)
    }
}

/// No-op reporter for headless/test usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl StageReporter for SilentReporter {
    fn stage(&self, _description: Option<&str>, _phase: StagePhase) {}
}
