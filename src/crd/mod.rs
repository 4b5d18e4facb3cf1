//! Custom Resource Definitions managed by the operator.
//!
//! - [`ChangeTriggeredJob`]: binds a list of watched resource references to
//!   a Job template and trigger policy.

mod change_triggered_job;

pub use change_triggered_job::{
    ChangeTriggeredJob, ChangeTriggeredJobSpec, ChangeTriggeredJobStatus, FieldHash, JobState,
    ResourceFingerprint, ResourceReference, TriggerCondition, CHANGED_AT_ANNOTATION,
    DEFAULT_COOLDOWN, DEFAULT_HISTORY, OWNER_LABEL,
};
