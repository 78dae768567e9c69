use std::fmt;

use thiserror::Error;

/// Fatal errors: anything that prevents producing a usable page state for the
/// planner. Soft interaction problems use [`InteractionFailure`] instead and
/// never abort a step.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown action `{0}`: not a browser primitive or a registered plugin action")]
    UnknownAction(String),

    #[error("failed to launch browser session: {0}")]
    SessionLaunch(#[source] anyhow::Error),

    #[error("navigation to {url} failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("page reduction failed: {0}")]
    Reduction(#[source] anyhow::Error),

    #[error("state store failure: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("corrupt action record {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// A click or type that did not land, even after fallback. Logged by the
/// dispatcher and intentionally not propagated: the reduced page state itself
/// tells the planner the element did not change.
#[derive(Debug, Error)]
#[error("{kind} on `{target}` failed: {message}")]
pub struct InteractionFailure {
    pub kind: InteractionKind,
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Click,
    Type,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionKind::Click => f.write_str("click"),
            InteractionKind::Type => f.write_str("type"),
        }
    }
}

/// Plugin handler failure. Surfaces to the planner as the action's `result`
/// text rather than as an error from `execute`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PluginFailure(pub String);
