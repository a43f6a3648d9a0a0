use crate::{ConnectionState, Outpost};

/// What a single reconciliation step did.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Unchanged,
    Created,
    Updated,
    Recreated,
    Deleted,
    Absent,
    Started,
    Restarted,
    Skipped,
    Disabled,
}

/// Receives reconciliation events, e.g. to export them as metrics.
pub trait Observe: Send + Sync {
    fn reconciled(&self, outpost: &Outpost, component: &str, outcome: Outcome);

    fn failed(&self, outpost: &Outpost, component: &str);

    fn connection_state(&self, _connection: &str, _state: &ConnectionState) {}
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

// === impl Outcome ===

impl Outcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Recreated => "recreated",
            Self::Deleted => "deleted",
            Self::Absent => "absent",
            Self::Started => "started",
            Self::Restarted => "restarted",
            Self::Skipped => "skipped",
            Self::Disabled => "disabled",
        }
    }

    /// Whether the step changed anything on the backend.
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Created
                | Self::Updated
                | Self::Recreated
                | Self::Deleted
                | Self::Started
                | Self::Restarted
        )
    }
}

// === impl NoopObserver ===

impl Observe for NoopObserver {
    fn reconciled(&self, _: &Outpost, _: &str, _: Outcome) {}

    fn failed(&self, _: &Outpost, _: &str) {}
}
