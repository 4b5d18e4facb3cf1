//! Kubernetes operator that fires batch Jobs when watched resources change.
//!
//! This crate implements a declarative custom resource, [`ChangeTriggeredJob`],
//! that binds a list of resource references to a Job template. The operator
//! polls the referenced objects on a fixed cadence, fingerprints the watched
//! fields with stable content hashes, and materializes a new Job whenever the
//! trigger condition is met and the cooldown has elapsed.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: triggers.changejob.dev/v1alpha
//! kind: ChangeTriggeredJob
//! metadata:
//!   name: reload-on-config
//! spec:
//!   resources:
//!     - apiVersion: v1
//!       kind: ConfigMap
//!       name: app-config
//!       namespace: default
//!       fields: ["data.config"]
//!   condition: Any
//!   cooldown: 60s
//!   history: 5
//!   jobTemplate:
//!     spec:
//!       template:
//!         spec:
//!           restartPolicy: Never
//!           containers:
//!             - name: reload
//!               image: busybox
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod fields;
pub mod hash;
pub mod registry;
pub mod webhook;

pub use crd::{ChangeTriggeredJob, ChangeTriggeredJobSpec, ChangeTriggeredJobStatus};
pub use error::{OperatorError, OperatorResult};
