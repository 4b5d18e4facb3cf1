//! ChangeTriggeredJob Custom Resource Definition.
//!
//! A ChangeTriggeredJob watches a set of Kubernetes objects and creates a
//! Job from its embedded template whenever the watched fields change.

use k8s_openapi::api::batch::v1::JobTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Label stamped on every Job the operator creates, keyed to the owning
/// trigger's name. Also used as the list selector by the history pruner.
pub const OWNER_LABEL: &str = "changejob.dev/owner";

/// Annotation stamped by the defaulting webhook with the UTC RFC-3339 time
/// of the last create/update. Opaque to the reconciler.
pub const CHANGED_AT_ANNOTATION: &str = "changetriggeredjobs.triggers.changejob.dev/changed-at";

/// Default cooldown between two successive Job firings.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Default number of owned Jobs retained by the history pruner.
pub const DEFAULT_HISTORY: i32 = 5;

/// ChangeTriggeredJob is the Schema for the changetriggeredjobs API.
///
/// The operator polls every referenced resource on a fixed cadence, hashes
/// the watched fields, and fires a Job from `jobTemplate` when the trigger
/// condition holds and the cooldown has elapsed.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "triggers.changejob.dev",
    version = "v1alpha",
    kind = "ChangeTriggeredJob",
    plural = "changetriggeredjobs",
    shortname = "ctj",
    namespaced,
    status = "ChangeTriggeredJobStatus",
    printcolumn = r#"{"name":"Condition", "type":"string", "jsonPath":".spec.condition"}"#,
    printcolumn = r#"{"name":"Last Job", "type":"string", "jsonPath":".status.lastJobName"}"#,
    printcolumn = r#"{"name":"Last Triggered", "type":"date", "jsonPath":".status.lastTriggeredTime"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTriggeredJobSpec {
    /// Job template used as the body for every fired Job.
    pub job_template: JobTemplateSpec,

    /// Resources to watch. Must contain at least one entry.
    pub resources: Vec<ResourceReference>,

    /// Trigger condition: fire when All or Any watched resource changes.
    /// The admission defaulter fills `Any` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<TriggerCondition>,

    /// Cooldown between triggers, in humantime grammar (e.g. `60s`, `5m`).
    /// The admission defaulter fills `60s` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<String>,

    /// Number of owned Jobs to retain. The admission defaulter fills 5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<i32>,
}

impl ChangeTriggeredJobSpec {
    /// Effective trigger condition, defaulting to `Any`.
    pub fn condition(&self) -> TriggerCondition {
        self.condition.unwrap_or_default()
    }

    /// Effective cooldown. Unparseable values degrade to the default so a
    /// trigger that slipped past admission still reconciles.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
            .as_deref()
            .and_then(|raw| humantime::parse_duration(raw.trim()).ok())
            .unwrap_or(DEFAULT_COOLDOWN)
    }

    /// Effective history bound, always at least 1.
    pub fn history(&self) -> usize {
        self.history.filter(|h| *h >= 1).unwrap_or(DEFAULT_HISTORY) as usize
    }
}

/// Reference to a watched Kubernetes object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    /// API version of the resource, e.g. `v1` or `apps/v1`.
    pub api_version: String,

    /// Kind of the resource, e.g. `ConfigMap`, `Deployment`.
    pub kind: String,

    /// Name of the resource.
    pub name: String,

    /// Namespace of the resource. Required for namespaced kinds, forbidden
    /// for cluster-scoped kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Dotted field paths to track within the resource. `["*"]` (or an
    /// empty list) tracks the entire object.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// Trigger condition: how many watched resources must change to fire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TriggerCondition {
    /// Fire only when every watched resource changed.
    All,
    /// Fire when at least one watched resource changed.
    #[default]
    Any,
}

/// Observed state of the most recently created Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum JobState {
    /// The Job has running pods.
    Active,
    /// The Job completed successfully.
    Succeeded,
    /// The Job has failed pods.
    Failed,
}

/// Persisted content fingerprint of one watched resource.
///
/// Identity fields copy the spec reference verbatim; they are the matching
/// key between spec references and status entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFingerprint {
    /// API version of the fingerprinted resource.
    pub api_version: String,
    /// Kind of the fingerprinted resource.
    pub kind: String,
    /// Name of the fingerprinted resource.
    pub name: String,
    /// Namespace of the fingerprinted resource, if namespaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// One digest per field path found in the object.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldHash>,
}

impl ResourceFingerprint {
    /// Whether this fingerprint records the given spec reference.
    pub fn matches(&self, reference: &ResourceReference) -> bool {
        self.api_version == reference.api_version
            && self.kind == reference.kind
            && self.name == reference.name
            && self.namespace == reference.namespace
    }

    /// Digest recorded for a field path, if the path was present.
    pub fn hash_for(&self, path: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.path == path)
            .map(|field| field.hash.as_str())
    }
}

/// Stable content digest of one field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldHash {
    /// Dotted field path, or `*` for the whole object.
    pub path: String,
    /// Lowercase hex SHA-256 of the canonical JSON encoding of the value.
    pub hash: String,
}

/// ChangeTriggeredJob status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTriggeredJobStatus {
    /// Conditions representing the current state of the trigger.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Last persisted fingerprints, one per spec resource in input order.
    /// `None` means no successful poll has ever completed; a trigger in
    /// that state never fires a Job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_hashes: Option<Vec<ResourceFingerprint>>,

    /// Time of the most recent successful trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_triggered_time: Option<Time>,

    /// Name of the most recently created Job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_job_name: Option<String>,

    /// Observed state of the most recently created Job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_job_status: Option<JobState>,
}
