//! Custom Resource Definitions for the tenancy hierarchy

mod org;
mod space;
mod types;

pub use org::{Org, OrgSpec};
pub use space::{Space, SpaceSpec};
pub use types::{
    validate_display_name, validate_dns_label, Condition, ConditionStatus, HierarchyStatus,
};
