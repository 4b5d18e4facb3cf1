//! REST-mapping oracle for watched resource kinds.
//!
//! The operator resolves every `apiVersion`/`kind` pair against a static
//! table of supported group-version-kinds. The table carries the plural
//! name (needed to build a dynamic API path) and the scope, which drives
//! namespace validation: namespaced kinds require a namespace, cluster
//! kinds forbid one.

use crate::crd::ResourceReference;
use crate::error::{OperatorError, OperatorResult};
use kube::api::ApiResource;
use kube::core::GroupVersionKind;

/// Scope of an API type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Objects live inside a namespace.
    Namespaced,
    /// Objects are cluster-global.
    Cluster,
}

/// One entry of the REST-mapping table.
#[derive(Debug, Clone, Copy)]
pub struct RestMapping {
    /// API group; empty for the core group.
    pub group: &'static str,
    /// API version within the group.
    pub version: &'static str,
    /// Kind name.
    pub kind: &'static str,
    /// Plural resource name.
    pub plural: &'static str,
    /// Scope of the kind.
    pub scope: Scope,
}

impl RestMapping {
    /// Dynamic API resource descriptor for this mapping.
    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(self.group, self.version, self.kind);
        ApiResource::from_gvk_with_plural(&gvk, self.plural)
    }
}

static SUPPORTED: &[RestMapping] = &[
    // Core
    RestMapping {
        group: "",
        version: "v1",
        kind: "ConfigMap",
        plural: "configmaps",
        scope: Scope::Namespaced,
    },
    RestMapping {
        group: "",
        version: "v1",
        kind: "Secret",
        plural: "secrets",
        scope: Scope::Namespaced,
    },
    RestMapping {
        group: "",
        version: "v1",
        kind: "Service",
        plural: "services",
        scope: Scope::Namespaced,
    },
    RestMapping {
        group: "",
        version: "v1",
        kind: "Namespace",
        plural: "namespaces",
        scope: Scope::Cluster,
    },
    RestMapping {
        group: "",
        version: "v1",
        kind: "Node",
        plural: "nodes",
        scope: Scope::Cluster,
    },
    // Workloads
    RestMapping {
        group: "apps",
        version: "v1",
        kind: "Deployment",
        plural: "deployments",
        scope: Scope::Namespaced,
    },
    RestMapping {
        group: "apps",
        version: "v1",
        kind: "StatefulSet",
        plural: "statefulsets",
        scope: Scope::Namespaced,
    },
    // Batch
    RestMapping {
        group: "batch",
        version: "v1",
        kind: "Job",
        plural: "jobs",
        scope: Scope::Namespaced,
    },
];

/// Split an `apiVersion` string into `(group, version)`.
///
/// `v1` is the core group; `apps/v1` is a named group. Anything with more
/// than one slash or an empty component is invalid.
pub fn parse_api_version(api_version: &str) -> OperatorResult<(&str, &str)> {
    let mut parts = api_version.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(version), None, None) if !version.is_empty() => Ok(("", version)),
        (Some(group), Some(version), None) if !group.is_empty() && !version.is_empty() => {
            Ok((group, version))
        }
        _ => Err(OperatorError::InvalidReference(format!(
            "invalid apiVersion {api_version:?}"
        ))),
    }
}

/// Resolve an `apiVersion`/`kind` pair against the supported table.
pub fn mapping_for(api_version: &str, kind: &str) -> OperatorResult<&'static RestMapping> {
    let (group, version) = parse_api_version(api_version)?;
    SUPPORTED
        .iter()
        .find(|m| m.group == group && m.version == version && m.kind == kind)
        .ok_or_else(|| {
            OperatorError::InvalidReference(format!(
                "unknown kind {kind:?} in apiVersion {api_version:?} (supported: {})",
                supported_kinds().join(", ")
            ))
        })
}

/// Validate a resource reference: the kind must be known and the namespace
/// must agree with the kind's scope.
pub fn validate_reference(reference: &ResourceReference) -> OperatorResult<&'static RestMapping> {
    let mapping = mapping_for(&reference.api_version, &reference.kind)?;
    let namespace = reference.namespace.as_deref().unwrap_or("");
    match mapping.scope {
        Scope::Namespaced if namespace.is_empty() => Err(OperatorError::InvalidReference(
            format!("namespace is required for namespaced resource {}", reference.kind),
        )),
        Scope::Cluster if !namespace.is_empty() => Err(OperatorError::InvalidReference(format!(
            "cluster-scoped resource {} must not have a namespace",
            reference.kind
        ))),
        _ => Ok(mapping),
    }
}

/// Human-readable list of supported kinds, used in error messages.
pub fn supported_kinds() -> Vec<String> {
    SUPPORTED
        .iter()
        .map(|m| {
            if m.group.is_empty() {
                format!("{}/{}", m.version, m.kind)
            } else {
                format!("{}/{}/{}", m.group, m.version, m.kind)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(api_version: &str, kind: &str, namespace: Option<&str>) -> ResourceReference {
        ResourceReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: "target".to_string(),
            namespace: namespace.map(str::to_string),
            fields: vec![],
        }
    }

    #[test]
    fn parses_core_and_grouped_versions() {
        assert_eq!(parse_api_version("v1").unwrap(), ("", "v1"));
        assert_eq!(parse_api_version("apps/v1").unwrap(), ("apps", "v1"));
        assert!(parse_api_version("").is_err());
        assert!(parse_api_version("apps/v1/extra").is_err());
        assert!(parse_api_version("/v1").is_err());
        assert!(parse_api_version("apps/").is_err());
    }

    #[test]
    fn resolves_known_kinds() {
        let mapping = mapping_for("v1", "ConfigMap").unwrap();
        assert_eq!(mapping.plural, "configmaps");
        assert_eq!(mapping.scope, Scope::Namespaced);

        let mapping = mapping_for("apps/v1", "Deployment").unwrap();
        assert_eq!(mapping.plural, "deployments");

        let mapping = mapping_for("v1", "Node").unwrap();
        assert_eq!(mapping.scope, Scope::Cluster);
    }

    #[test]
    fn rejects_unknown_kind() {
        let error = mapping_for("v1", "Widget").unwrap_err();
        assert!(matches!(error, OperatorError::InvalidReference(_)));
        assert!(error.to_string().contains("Widget"));
    }

    #[test]
    fn namespaced_kind_requires_namespace() {
        assert!(validate_reference(&reference("v1", "ConfigMap", Some("default"))).is_ok());

        let error = validate_reference(&reference("v1", "ConfigMap", None)).unwrap_err();
        assert!(error.to_string().contains("namespace is required"));

        let error = validate_reference(&reference("v1", "ConfigMap", Some(""))).unwrap_err();
        assert!(error.to_string().contains("namespace is required"));
    }

    #[test]
    fn cluster_kind_forbids_namespace() {
        assert!(validate_reference(&reference("v1", "Node", None)).is_ok());

        let error = validate_reference(&reference("v1", "Node", Some("default"))).unwrap_err();
        assert!(error.to_string().contains("must not have a namespace"));
    }

    #[test]
    fn api_resource_uses_table_plural() {
        let resource = mapping_for("batch/v1", "Job").unwrap().api_resource();
        assert_eq!(resource.plural, "jobs");
        assert_eq!(resource.kind, "Job");
        assert_eq!(resource.group, "batch");
    }
}
