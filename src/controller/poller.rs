//! Polls one watched resource into a content fingerprint.
//!
//! Composes the object fetcher (a scope-validated dynamic GET) with field
//! extraction and hashing. The returned fingerprint copies the reference
//! identity verbatim so downstream diffing keys on the spec, not on
//! whatever the fetched object self-reports.

use crate::crd::{FieldHash, ResourceFingerprint, ResourceReference};
use crate::error::{OperatorError, OperatorResult};
use crate::{fields, hash, registry};
use kube::api::{Api, DynamicObject};
use kube::Client;
use serde_json::Value;

/// Fetches and fingerprints watched Kubernetes resources.
pub struct Poller {
    client: Client,
}

impl Poller {
    /// Create a new poller.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch the referenced resource, extract its watched fields, and hash
    /// them.
    ///
    /// Fails with [`OperatorError::InvalidReference`] before any I/O when
    /// the kind is unknown or the namespace disagrees with the kind's
    /// scope, and with [`OperatorError::WatchedResourceMissing`] when the
    /// object does not exist.
    pub async fn poll(&self, reference: &ResourceReference) -> OperatorResult<ResourceFingerprint> {
        let mapping = registry::validate_reference(reference)?;
        let resource = mapping.api_resource();

        let api: Api<DynamicObject> = match reference.namespace.as_deref() {
            Some(namespace) if !namespace.is_empty() => {
                Api::namespaced_with(self.client.clone(), namespace, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        };

        let object = match api.get(&reference.name).await {
            Ok(object) => object,
            Err(kube::Error::Api(response)) if response.code == 404 => {
                return Err(OperatorError::WatchedResourceMissing {
                    kind: reference.kind.clone(),
                    name: reference.name.clone(),
                    namespace: reference.namespace.clone(),
                });
            }
            Err(error) => return Err(error.into()),
        };
        tracing::debug!(
            kind = %reference.kind,
            name = %reference.name,
            "Watched resource fetched"
        );

        let tree = serde_json::to_value(&object)?;
        Ok(ResourceFingerprint {
            api_version: reference.api_version.clone(),
            kind: reference.kind.clone(),
            name: reference.name.clone(),
            namespace: reference.namespace.clone(),
            fields: fingerprint_fields(&tree, &effective_paths(&reference.fields)),
        })
    }
}

/// Effective path set: the declared fields, or `["*"]` when none are
/// declared.
pub fn effective_paths(declared: &[String]) -> Vec<String> {
    if declared.is_empty() {
        vec![fields::WHOLE_OBJECT.to_string()]
    } else {
        declared.to_vec()
    }
}

/// Hash each requested path found in the tree, in input order. Absent
/// paths are omitted, not errors.
pub fn fingerprint_fields(tree: &Value, paths: &[String]) -> Vec<FieldHash> {
    let mut hashes = Vec::with_capacity(paths.len());
    for path in paths {
        match fields::lookup_path(tree, path) {
            Some(value) => hashes.push(FieldHash {
                path: path.clone(),
                hash: hash::digest(value),
            }),
            None => {
                tracing::debug!(path = %path, "Field path absent, omitted from fingerprint");
            }
        }
    }
    hashes
}
