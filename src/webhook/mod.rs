//! Admission policy for ChangeTriggeredJob create/update requests.
//!
//! The mutating webhook fills unset `cooldown`, `condition`, and `history`
//! and stamps the changed-at annotation; the validating webhook rejects
//! specs the reconciler could never act on. Both are pure functions over
//! the submitted object — the HTTPS server lives in `bin/webhook.rs`, and
//! the dry-run job-template check (which needs an API client) is performed
//! there.

use crate::crd::{ChangeTriggeredJob, CHANGED_AT_ANNOTATION};
use crate::error::OperatorResult;
use crate::registry;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Default cooldown filled by the defaulter, as written into the spec.
pub const DEFAULT_COOLDOWN_VALUE: &str = "60s";

/// Kubernetes AdmissionReview envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdmissionReview {
    /// Always `admission.k8s.io/v1`.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Always `AdmissionReview`.
    pub kind: String,
    /// Present on incoming reviews.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    /// Present on outgoing reviews.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

/// The request half of an AdmissionReview.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdmissionRequest {
    /// Opaque request id, echoed in the response.
    pub uid: String,
    /// CREATE, UPDATE, DELETE or CONNECT.
    #[serde(default)]
    pub operation: String,
    /// The submitted object.
    pub object: Option<ChangeTriggeredJob>,
}

/// The response half of an AdmissionReview.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdmissionResponse {
    /// Request id being answered.
    pub uid: String,
    /// Whether the operation is admitted.
    pub allowed: bool,
    /// Rejection detail when not allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionStatus>,
    /// `JSONPatch` when a patch is attached.
    #[serde(rename = "patchType", skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
    /// Base64-encoded RFC 6902 patch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

/// Status detail attached to a rejection.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdmissionStatus {
    /// HTTP-style status code.
    pub code: i32,
    /// Human-readable rejection message.
    pub message: String,
}

/// Wrap a response into an outgoing AdmissionReview.
pub fn review_response(response: AdmissionResponse) -> AdmissionReview {
    AdmissionReview {
        api_version: "admission.k8s.io/v1".to_string(),
        kind: "AdmissionReview".to_string(),
        request: None,
        response: Some(response),
    }
}

/// Plain admission.
pub fn response_allowed(uid: String) -> AdmissionResponse {
    AdmissionResponse {
        uid,
        allowed: true,
        status: None,
        patch_type: None,
        patch: None,
    }
}

/// Rejection with a 403-style status message.
pub fn response_denied(uid: String, message: String) -> AdmissionResponse {
    AdmissionResponse {
        uid,
        allowed: false,
        status: Some(AdmissionStatus { code: 403, message }),
        patch_type: None,
        patch: None,
    }
}

/// Admission carrying a JSON Patch. An empty op list degrades to a plain
/// admission.
pub fn response_patched(uid: String, ops: &[Value]) -> OperatorResult<AdmissionResponse> {
    if ops.is_empty() {
        return Ok(response_allowed(uid));
    }
    let raw = serde_json::to_vec(ops)?;
    Ok(AdmissionResponse {
        uid,
        allowed: true,
        status: None,
        patch_type: Some("JSONPatch".to_string()),
        patch: Some(base64::engine::general_purpose::STANDARD.encode(raw)),
    })
}

/// Compute the defaulting patch for a submitted trigger.
///
/// Fills `cooldown` (60s), `condition` (Any), and `history` (5) when
/// unset, and stamps the changed-at annotation with `now` on every
/// create/update.
pub fn defaulting_patch(trigger: &ChangeTriggeredJob, now: DateTime<Utc>) -> Vec<Value> {
    let mut ops = Vec::new();

    if trigger.spec.cooldown.is_none() {
        ops.push(json!({"op": "add", "path": "/spec/cooldown", "value": DEFAULT_COOLDOWN_VALUE}));
    }
    if trigger.spec.condition.is_none() {
        ops.push(json!({"op": "add", "path": "/spec/condition", "value": "Any"}));
    }
    if trigger.spec.history.is_none() {
        ops.push(json!({"op": "add", "path": "/spec/history", "value": 5}));
    }

    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    match &trigger.metadata.annotations {
        None => {
            ops.push(json!({
                "op": "add",
                "path": "/metadata/annotations",
                "value": { CHANGED_AT_ANNOTATION: stamp },
            }));
        }
        Some(_) => {
            ops.push(json!({
                "op": "add",
                "path": format!("/metadata/annotations/{}", escape_pointer(CHANGED_AT_ANNOTATION)),
                "value": stamp,
            }));
        }
    }

    ops
}

/// Validate a submitted trigger.
///
/// Rejects empty `resources`, references failing the REST-mapping oracle,
/// `history < 1`, and a `cooldown` that is not a valid duration. The
/// job-template dry-run check is separate because it needs a client.
pub fn validate(trigger: &ChangeTriggeredJob) -> Result<(), String> {
    if trigger.spec.resources.is_empty() {
        return Err("spec.resources: at least one resource must be specified".to_string());
    }

    for (index, reference) in trigger.spec.resources.iter().enumerate() {
        registry::validate_reference(reference)
            .map_err(|error| format!("spec.resources[{index}]: {error}"))?;
    }

    if let Some(history) = trigger.spec.history {
        if history < 1 {
            return Err(format!("spec.history: must be >= 1, got {history}"));
        }
    }

    if let Some(cooldown) = trigger.spec.cooldown.as_deref() {
        humantime::parse_duration(cooldown.trim())
            .map_err(|error| format!("spec.cooldown: invalid duration {cooldown:?}: {error}"))?;
    }

    Ok(())
}

/// Escape a map key for use in a JSON Pointer path (RFC 6901).
fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ChangeTriggeredJobSpec, ResourceReference, TriggerCondition};
    use chrono::TimeZone;
    use k8s_openapi::api::batch::v1::JobTemplateSpec;
    use std::collections::BTreeMap;

    fn reference() -> ResourceReference {
        ResourceReference {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            name: "cm".to_string(),
            namespace: Some("default".to_string()),
            fields: vec![],
        }
    }

    fn trigger(spec: ChangeTriggeredJobSpec) -> ChangeTriggeredJob {
        let mut trigger = ChangeTriggeredJob::new("demo", spec);
        trigger.metadata.namespace = Some("default".to_string());
        trigger
    }

    fn bare_spec() -> ChangeTriggeredJobSpec {
        ChangeTriggeredJobSpec {
            job_template: JobTemplateSpec::default(),
            resources: vec![reference()],
            condition: None,
            cooldown: None,
            history: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn defaulter_fills_every_unset_field() {
        let ops = defaulting_patch(&trigger(bare_spec()), now());

        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0]["path"], "/spec/cooldown");
        assert_eq!(ops[0]["value"], "60s");
        assert_eq!(ops[1]["path"], "/spec/condition");
        assert_eq!(ops[1]["value"], "Any");
        assert_eq!(ops[2]["path"], "/spec/history");
        assert_eq!(ops[2]["value"], 5);
        // Annotations map does not exist yet, so it is created wholesale.
        assert_eq!(ops[3]["path"], "/metadata/annotations");
        assert_eq!(
            ops[3]["value"][CHANGED_AT_ANNOTATION],
            "2025-06-01T12:00:00Z"
        );
    }

    #[test]
    fn defaulter_leaves_set_fields_alone() {
        let mut spec = bare_spec();
        spec.cooldown = Some("5m".to_string());
        spec.condition = Some(TriggerCondition::All);
        spec.history = Some(2);
        let mut subject = trigger(spec);
        subject.metadata.annotations =
            Some(BTreeMap::from([("note".to_string(), "x".to_string())]));

        let ops = defaulting_patch(&subject, now());

        // Only the changed-at stamp remains, addressed into the existing map.
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0]["path"],
            format!(
                "/metadata/annotations/{}",
                "changetriggeredjobs.triggers.changejob.dev~1changed-at"
            )
        );
        assert_eq!(ops[0]["value"], "2025-06-01T12:00:00Z");
    }

    #[test]
    fn pointer_escaping() {
        assert_eq!(escape_pointer("a/b"), "a~1b");
        assert_eq!(escape_pointer("a~b"), "a~0b");
        assert_eq!(escape_pointer("plain"), "plain");
    }

    #[test]
    fn validator_accepts_well_formed_spec() {
        assert!(validate(&trigger(bare_spec())).is_ok());
    }

    #[test]
    fn validator_rejects_empty_resources() {
        let mut spec = bare_spec();
        spec.resources.clear();

        let message = validate(&trigger(spec)).unwrap_err();
        assert!(message.contains("at least one resource"));
    }

    #[test]
    fn validator_rejects_unknown_kind() {
        let mut spec = bare_spec();
        spec.resources[0].kind = "Widget".to_string();

        let message = validate(&trigger(spec)).unwrap_err();
        assert!(message.contains("spec.resources[0]"));
        assert!(message.contains("Widget"));
    }

    #[test]
    fn validator_rejects_scope_mismatches() {
        let mut spec = bare_spec();
        spec.resources[0].namespace = None;
        let message = validate(&trigger(spec)).unwrap_err();
        assert!(message.contains("namespace is required"));

        let mut spec = bare_spec();
        spec.resources[0].kind = "Node".to_string();
        let message = validate(&trigger(spec)).unwrap_err();
        assert!(message.contains("must not have a namespace"));
    }

    #[test]
    fn validator_rejects_bad_history_and_cooldown() {
        let mut spec = bare_spec();
        spec.history = Some(0);
        assert!(validate(&trigger(spec)).unwrap_err().contains("history"));

        let mut spec = bare_spec();
        spec.cooldown = Some("-10s".to_string());
        assert!(validate(&trigger(spec)).unwrap_err().contains("cooldown"));

        let mut spec = bare_spec();
        spec.cooldown = Some("whenever".to_string());
        assert!(validate(&trigger(spec)).unwrap_err().contains("cooldown"));
    }

    #[test]
    fn patched_response_is_base64_json_patch() {
        let ops = vec![json!({"op": "add", "path": "/spec/history", "value": 5})];
        let response = response_patched("uid-1".to_string(), &ops).unwrap();

        assert!(response.allowed);
        assert_eq!(response.patch_type.as_deref(), Some("JSONPatch"));
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(response.patch.unwrap())
            .unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(parsed, ops);
    }

    #[test]
    fn empty_patch_degrades_to_plain_admission() {
        let response = response_patched("uid-1".to_string(), &[]).unwrap();
        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert!(response.patch_type.is_none());
    }

    #[test]
    fn review_round_trip() {
        let raw = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "uid-9",
                "operation": "CREATE",
                "object": {
                    "apiVersion": "triggers.changejob.dev/v1alpha",
                    "kind": "ChangeTriggeredJob",
                    "metadata": {"name": "demo", "namespace": "default"},
                    "spec": {
                        "jobTemplate": {},
                        "resources": [
                            {"apiVersion": "v1", "kind": "ConfigMap", "name": "cm", "namespace": "default"}
                        ]
                    }
                }
            }
        });

        let review: AdmissionReview = serde_json::from_value(raw).unwrap();
        let request = review.request.unwrap();
        assert_eq!(request.uid, "uid-9");
        assert!(validate(request.object.as_ref().unwrap()).is_ok());

        let out = review_response(response_allowed(request.uid));
        let encoded = serde_json::to_value(&out).unwrap();
        assert_eq!(encoded["response"]["uid"], "uid-9");
        assert_eq!(encoded["response"]["allowed"], true);
        assert!(encoded.get("request").is_none());
    }
}
