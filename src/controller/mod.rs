//! Reconciliation engine for ChangeTriggeredJob resources.
//!
//! # Usage with kube-runtime
//!
//! The controller runtime requires both a reconcile function and an error
//! policy:
//!
//! ```ignore
//! use changejob_operator::controller::{ChangeTriggeredJobController, error_policy};
//!
//! Controller::new(triggers, watcher_config)
//!     .run(|trigger, ctx| async move {
//!         let controller = ChangeTriggeredJobController::new(ctx.clone());
//!         controller.reconcile(trigger).await
//!     }, error_policy, context)
//!     .for_each(|_| futures::future::ready(()))
//!     .await;
//! ```

mod change_triggered_job;
pub mod detect;
pub mod jobs;
mod poller;

pub use change_triggered_job::{error_policy, ChangeTriggeredJobController};
pub use poller::Poller;

use crate::config::ControllerConfig;

/// Shared context for the controller.
pub struct ControllerContext {
    /// Kubernetes client.
    pub client: kube::Client,
    /// Process-wide configuration.
    pub config: ControllerConfig,
}

impl ControllerContext {
    /// Create a new controller context.
    pub fn new(client: kube::Client, config: ControllerConfig) -> Self {
        Self { client, config }
    }
}

/// Result type for reconciliation actions.
#[derive(Debug)]
pub enum ReconcileAction {
    /// Requeue after the specified duration.
    Requeue(std::time::Duration),
    /// Don't requeue; wait for the trigger object to change.
    Done,
}
