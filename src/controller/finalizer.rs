//! Finalizer handling
//!
//! The finalizer is added before any provisioning side effect and removed
//! only after boundary deletion has been accepted. Patches carry the
//! resourceVersion that was read so a stale write is rejected by the API
//! server instead of clobbering someone else's finalizer list.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Value};

use crate::FINALIZER;

/// Whether our finalizer is present
pub fn has_finalizer(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == FINALIZER))
}

/// Finalizer list with ours appended (if missing); other entries keep their order
pub fn with_finalizer(meta: &ObjectMeta) -> Vec<String> {
    let mut finalizers = meta.finalizers.clone().unwrap_or_default();
    if !finalizers.iter().any(|f| f == FINALIZER) {
        finalizers.push(FINALIZER.to_string());
    }
    finalizers
}

/// Finalizer list with ours removed
pub fn without_finalizer(meta: &ObjectMeta) -> Vec<String> {
    meta.finalizers
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect()
}

/// Merge patch setting `finalizers`, guarded by the resourceVersion in `meta`
pub fn finalizer_patch(meta: &ObjectMeta, finalizers: Vec<String>) -> Value {
    json!({
        "metadata": {
            "resourceVersion": meta.resource_version,
            "finalizers": finalizers,
        }
    })
}
