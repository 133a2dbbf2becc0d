use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::rewrite::RewriteOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Built once at startup with its collaborators and immutable settings.
    pub orchestrator: Arc<RewriteOrchestrator>,
    pub config: Config,
    /// Cancelled on shutdown. Every rewrite run holds a child token.
    pub shutdown: CancellationToken,
}
