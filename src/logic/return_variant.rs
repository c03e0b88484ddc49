use crate::model::{Distribution, ReturnVariant};

/// Classifies a rule's outcome from its synchronized distributions.
///
/// A single distribution at 100% makes the rule deterministic. Without one,
/// a persisted rule must already be a weighted rollout, while a rule that has
/// never been saved has nothing to infer from and stays unset.
pub fn derive_return_variant(distributions: &[Distribution], is_new: bool) -> ReturnVariant {
    let mut full = distributions.iter().filter(|d| d.percentage == 100);
    match (full.next(), full.next()) {
        (Some(d), None) if !d.variant.is_empty() => ReturnVariant::Variant(d.variant.id.clone()),
        _ if is_new => ReturnVariant::Unset,
        _ => ReturnVariant::Rollout,
    }
}
