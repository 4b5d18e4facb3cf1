//! Job materialization and history pruning.
//!
//! Every fired Job is stamped with a controller owner reference back to
//! its trigger and the owner label, so deletion cascades and the pruner
//! can discover its children by query. Names use `generateName` with the
//! trigger name as prefix; the API server assigns the unique suffix,
//! keeping names inside the 63-character label constraint.

use crate::crd::{ChangeTriggeredJob, JobState, OWNER_LABEL};
use crate::error::{OperatorError, OperatorResult};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Resource, ResourceExt};

/// Build the Job a trigger fires, without creating it.
///
/// Labels are a shallow copy of the trigger's labels with the owner label
/// forcibly set to the trigger name; annotations are copied verbatim; the
/// spec is a deep copy of the embedded template's spec.
pub fn build_job(trigger: &ChangeTriggeredJob) -> OperatorResult<Job> {
    let name = trigger.name_any();
    let namespace = trigger
        .namespace()
        .ok_or_else(|| OperatorError::InvalidConfig("trigger must be namespaced".into()))?;
    let owner = trigger.controller_owner_ref(&()).ok_or_else(|| {
        OperatorError::InvalidConfig("trigger has no uid, cannot own a Job".into())
    })?;

    let mut labels = trigger.labels().clone();
    labels.insert(OWNER_LABEL.to_string(), name.clone());

    let annotations = trigger.annotations();
    Ok(Job {
        metadata: ObjectMeta {
            generate_name: Some(format!("{name}-")),
            namespace: Some(namespace),
            labels: Some(labels),
            annotations: (!annotations.is_empty()).then(|| annotations.clone()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: trigger.spec.job_template.spec.clone(),
        status: None,
    })
}

/// Create the Job a trigger fires.
pub async fn create_job(client: &Client, trigger: &ChangeTriggeredJob) -> OperatorResult<Job> {
    let job = build_job(trigger)?;
    let namespace = job.metadata.namespace.clone().unwrap_or_default();
    let api: Api<Job> = Api::namespaced(client.clone(), &namespace);

    let created = api.create(&PostParams::default(), &job).await?;
    tracing::info!(
        job = %created.name_any(),
        trigger = %trigger.name_any(),
        "Job created"
    );
    Ok(created)
}

/// Submit the embedded Job template as a server-side dry-run Create.
///
/// A 4xx rejection means the template itself is invalid and maps to
/// [`OperatorError::InvalidJobTemplate`]; any other failure is transient.
pub async fn validate_job_template(
    client: &Client,
    trigger: &ChangeTriggeredJob,
) -> OperatorResult<()> {
    let namespace = trigger
        .namespace()
        .ok_or_else(|| OperatorError::InvalidConfig("trigger must be namespaced".into()))?;

    let probe = Job {
        metadata: ObjectMeta {
            generate_name: Some("validate-jobtemplate-".to_string()),
            namespace: Some(namespace.clone()),
            ..Default::default()
        },
        spec: trigger.spec.job_template.spec.clone(),
        status: None,
    };

    let api: Api<Job> = Api::namespaced(client.clone(), &namespace);
    let params = PostParams {
        dry_run: true,
        field_manager: None,
    };
    match api.create(&params, &probe).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if (400..500).contains(&response.code) => {
            Err(OperatorError::InvalidJobTemplate(response.message))
        }
        Err(error) => Err(error.into()),
    }
}

/// List Jobs owned by the trigger, newest first.
///
/// Lists by the owner label, then filters by owner UID client-side (a
/// relabelled Job from another owner must not be adopted) and drops Jobs
/// already being deleted.
pub async fn list_owned_jobs(
    client: &Client,
    trigger: &ChangeTriggeredJob,
) -> OperatorResult<Vec<Job>> {
    let namespace = trigger
        .namespace()
        .ok_or_else(|| OperatorError::InvalidConfig("trigger must be namespaced".into()))?;
    let api: Api<Job> = Api::namespaced(client.clone(), &namespace);

    let selector = format!("{OWNER_LABEL}={}", trigger.name_any());
    let listed = api.list(&ListParams::default().labels(&selector)).await?;
    let owner_uid = trigger.uid().unwrap_or_default();

    Ok(sort_owned(listed.items, &owner_uid))
}

/// Keep Jobs owned by `owner_uid` that are not being deleted, sorted by
/// creation timestamp descending.
pub fn sort_owned(jobs: Vec<Job>, owner_uid: &str) -> Vec<Job> {
    let mut owned: Vec<Job> = jobs
        .into_iter()
        .filter(|job| job.metadata.deletion_timestamp.is_none())
        .filter(|job| {
            job.metadata
                .owner_references
                .as_deref()
                .unwrap_or_default()
                .iter()
                .any(|reference| reference.uid == owner_uid)
        })
        .collect();

    owned.sort_by(|a, b| {
        let a_created = a.metadata.creation_timestamp.as_ref().map(|t| t.0);
        let b_created = b.metadata.creation_timestamp.as_ref().map(|t| t.0);
        b_created.cmp(&a_created)
    });
    owned
}

/// Jobs past the history bound, oldest last.
pub fn prune_candidates(sorted: &[Job], history: usize) -> &[Job] {
    if sorted.len() > history {
        &sorted[history..]
    } else {
        &[]
    }
}

/// Delete owned Jobs past the trigger's history bound.
///
/// Deletion failures are logged; they never fail the reconcile.
pub async fn prune_history(client: &Client, trigger: &ChangeTriggeredJob, sorted: &[Job]) {
    for job in prune_candidates(sorted, trigger.spec.history()) {
        let name = job.name_any();
        let namespace = job.metadata.namespace.clone().unwrap_or_default();
        let api: Api<Job> = Api::namespaced(client.clone(), &namespace);

        match api.delete(&name, &DeleteParams::background()).await {
            Ok(_) => {
                tracing::info!(job = %name, trigger = %trigger.name_any(), "Pruned Job past history bound");
            }
            Err(error) => {
                tracing::warn!(job = %name, error = %error, "Failed to prune Job");
            }
        }
    }
}

/// Derive the coarse state of a Job from its observed counters.
///
/// Failed takes precedence over Active, Active over Succeeded; a Job with
/// no observed pods yet has no state.
pub fn job_state(job: &Job) -> Option<JobState> {
    let status = job.status.as_ref()?;
    if status.failed.unwrap_or(0) > 0 {
        Some(JobState::Failed)
    } else if status.active.unwrap_or(0) > 0 {
        Some(JobState::Active)
    } else if status.succeeded.unwrap_or(0) > 0 {
        Some(JobState::Succeeded)
    } else {
        None
    }
}
