use crate::compaction::compactor::KeepSet;
use crate::observation::Observation;

/// Identifiers of loaded observations that did not survive compaction, in
/// fetch order.
pub fn delete_set(observations: &[Observation], keep: &KeepSet) -> Vec<String> {
    observations
        .iter()
        .filter(|o| !keep.contains(&o.doc_id))
        .map(|o| o.doc_id.clone())
        .collect()
}
