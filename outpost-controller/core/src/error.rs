pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Aborts the current reconciliation of an outpost.
///
/// The backend is left as the failing step left it; the next scheduled run
/// picks up from there.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("invalid service connection: {0}")]
    InvalidConnection(#[source] BoxError),

    #[error("failed to reconcile {component}: {source}")]
    Component {
        component: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("docker: {0}")]
    Docker(#[source] BoxError),

    #[error("giving up after {attempts} attempts to converge the container")]
    GaveUp { attempts: usize },
}

// === impl ControllerError ===

impl ControllerError {
    pub fn invalid_connection(error: impl Into<BoxError>) -> Self {
        Self::InvalidConnection(error.into())
    }

    pub fn component(component: &'static str, error: impl Into<BoxError>) -> Self {
        Self::Component {
            component,
            source: error.into(),
        }
    }

    pub fn docker(error: impl Into<BoxError>) -> Self {
        Self::Docker(error.into())
    }
}
