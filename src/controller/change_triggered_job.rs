//! ChangeTriggeredJob reconciler.
//!
//! One reconcile tick: validate the spec, poll and fingerprint every
//! watched resource, diff against the persisted fingerprints, fire at most
//! one Job when the trigger condition holds and the cooldown has elapsed,
//! persist the new fingerprints and last-job metadata, then prune owned
//! Jobs past the history bound.
//!
//! The tick that first establishes fingerprints (the baseline) never
//! creates a Job; change detection needs a prior state to compare against.

use super::{detect, jobs, ControllerContext, Poller, ReconcileAction};
use crate::crd::{ChangeTriggeredJob, ChangeTriggeredJobStatus, ResourceFingerprint};
use crate::error::{OperatorError, OperatorResult};
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use std::sync::Arc;

const VALID_CONDITION: &str = "Valid";

/// Controller for ChangeTriggeredJob resources.
#[derive(Clone)]
pub struct ChangeTriggeredJobController {
    ctx: Arc<ControllerContext>,
}

impl ChangeTriggeredJobController {
    /// Create a new controller.
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    /// Reconcile one ChangeTriggeredJob.
    ///
    /// Transient errors (network, missing watched resource) bubble up so
    /// the scheduler retries. Fatal configuration errors (unknown kind,
    /// rejected job template) are recorded in the trigger's conditions and
    /// the reconciler waits for a spec change instead of requeueing.
    pub async fn reconcile(
        &self,
        trigger: Arc<ChangeTriggeredJob>,
    ) -> OperatorResult<ReconcileAction> {
        let name = trigger.name_any();
        let namespace = trigger
            .namespace()
            .ok_or_else(|| OperatorError::InvalidConfig("trigger must be namespaced".into()))?;

        tracing::info!(
            name = %name,
            namespace = %namespace,
            resources = trigger.spec.resources.len(),
            "Reconciling ChangeTriggeredJob"
        );

        let api: Api<ChangeTriggeredJob> =
            Api::namespaced(self.ctx.client.clone(), &namespace);

        match self.reconcile_inner(&api, &trigger).await {
            Ok(action) => Ok(action),
            Err(error) if error.is_fatal() => {
                tracing::warn!(
                    name = %name,
                    error = %error,
                    "Trigger configuration is invalid, waiting for spec change"
                );
                self.write_failure_condition(&api, &trigger, &error).await?;
                Ok(ReconcileAction::Done)
            }
            Err(error) => Err(error),
        }
    }

    async fn reconcile_inner(
        &self,
        api: &Api<ChangeTriggeredJob>,
        trigger: &ChangeTriggeredJob,
    ) -> OperatorResult<ReconcileAction> {
        let name = trigger.name_any();

        // Pre-flight: the job template must survive a dry-run Create before
        // any firing decision is made. Reference scope errors surface from
        // the poller below, but the template is checked up front so an
        // invalid template never burns a cooldown window.
        jobs::validate_job_template(&self.ctx.client, trigger).await?;

        let poller = Poller::new(self.ctx.client.clone());
        let (changed, fresh) = detect::detect(&poller, trigger).await?;

        if changed {
            let last_triggered = trigger
                .status
                .as_ref()
                .and_then(|status| status.last_triggered_time.as_ref());
            if detect::cooldown_elapsed(last_triggered, trigger.spec.cooldown(), Utc::now()) {
                jobs::create_job(&self.ctx.client, trigger).await?;
            } else {
                tracing::debug!(name = %name, "Change detected but cooldown has not elapsed");
            }
        }

        let owned = jobs::list_owned_jobs(&self.ctx.client, trigger).await?;
        let status = build_status(trigger, fresh, &owned, Utc::now());
        self.write_status(api, &name, status).await?;

        jobs::prune_history(&self.ctx.client, trigger, &owned).await;

        Ok(ReconcileAction::Requeue(self.ctx.config.poll_interval))
    }

    /// Record a fatal configuration error in the trigger's conditions.
    async fn write_failure_condition(
        &self,
        api: &Api<ChangeTriggeredJob>,
        trigger: &ChangeTriggeredJob,
        error: &OperatorError,
    ) -> OperatorResult<()> {
        let mut status = trigger.status.clone().unwrap_or_default();
        upsert_condition(
            &mut status.conditions,
            Condition {
                type_: VALID_CONDITION.to_string(),
                status: "False".to_string(),
                reason: error.reason().to_string(),
                message: error.to_string(),
                last_transition_time: Time(Utc::now()),
                observed_generation: trigger.metadata.generation,
            },
        );
        self.write_status(api, &trigger.name_any(), status).await
    }

    /// Persist the trigger's status through the `/status` subresource.
    async fn write_status(
        &self,
        api: &Api<ChangeTriggeredJob>,
        name: &str,
        status: ChangeTriggeredJobStatus,
    ) -> OperatorResult<()> {
        let patch = serde_json::json!({ "status": status });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Assemble the status written at the end of a successful tick.
///
/// Fingerprints are replaced wholesale; the last-job fields are derived
/// from the newest owned Job, preferring its own start time over the
/// current wall clock.
fn build_status(
    trigger: &ChangeTriggeredJob,
    fresh: Vec<ResourceFingerprint>,
    owned: &[Job],
    now: DateTime<Utc>,
) -> ChangeTriggeredJobStatus {
    let mut status = trigger.status.clone().unwrap_or_default();
    status.resource_hashes = Some(fresh);

    if let Some(newest) = owned.first() {
        status.last_job_name = Some(newest.name_any());
        status.last_triggered_time = newest
            .status
            .as_ref()
            .and_then(|job_status| job_status.start_time.clone())
            .or(Some(Time(now)));
        if let Some(state) = jobs::job_state(newest) {
            status.last_job_status = Some(state);
        }
    }

    upsert_condition(
        &mut status.conditions,
        Condition {
            type_: VALID_CONDITION.to_string(),
            status: "True".to_string(),
            reason: "Reconciled".to_string(),
            message: "resources polled and fingerprints persisted".to_string(),
            last_transition_time: Time(now),
            observed_generation: trigger.metadata.generation,
        },
    );
    status
}

/// Replace the condition of the same type, preserving the transition time
/// when the status value did not flip.
fn upsert_condition(conditions: &mut Vec<Condition>, mut next: Condition) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|condition| condition.type_ == next.type_)
    {
        if existing.status == next.status {
            next.last_transition_time = existing.last_transition_time.clone();
        }
        *existing = next;
    } else {
        conditions.push(next);
    }
}

/// Handle errors during reconciliation: retry after the poll interval.
pub fn error_policy(
    _trigger: Arc<ChangeTriggeredJob>,
    error: &OperatorError,
    ctx: Arc<ControllerContext>,
) -> kube::runtime::controller::Action {
    tracing::error!(error = %error, "Reconciliation error");
    kube::runtime::controller::Action::requeue(ctx.config.poll_interval)
}
