//! Canonical model builder.
//!
//! Every constructor turns a possibly-partial record into a complete entity.
//! Inputs are borrowed and never mutated; the only source of non-determinism
//! is id generation for entities that arrive without one.

use serde::{Deserialize, Serialize};

use crate::logic::return_variant::derive_return_variant;
use crate::model::{
    generate_id, Constraint, ConstraintRecord, Distribution, DistributionRecord, Flag, FlagRecord,
    Id, Operation, ReturnVariant, Rule, RuleRecord, Scalar, Segment, SegmentRecord, SegmentRule,
    SegmentRuleRecord, Variant, VariantRecord, VariantRef, VariantType,
};

/// Upper bound on the variants synthesized for a new flag.
pub const MAX_DEFAULT_VARIANTS: usize = 26;

/// Shape of the variants synthesized for a flag created from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDefaults {
    pub flag_type: VariantType,
    pub variant_count: usize,
}

impl Default for FlagDefaults {
    fn default() -> Self {
        Self {
            flag_type: VariantType::Boolean,
            variant_count: 2,
        }
    }
}

impl FlagDefaults {
    pub fn of_type(flag_type: VariantType) -> Self {
        Self {
            flag_type,
            ..Self::default()
        }
    }
}

/// Resolves the id of a record and whether the entity still needs creating.
fn identity(id: &Option<Id>, is_new: Option<bool>) -> (Id, bool) {
    match id {
        Some(id) if !id.is_empty() => (id.clone(), is_new.unwrap_or(false)),
        _ => (generate_id(), true),
    }
}

pub fn new_flag(record: &FlagRecord, defaults: &FlagDefaults) -> Flag {
    let (id, is_new) = identity(&record.id, record.is_new);

    let variants = match &record.variants {
        Some(variants) if !variants.is_empty() => variants.iter().map(new_variant).collect(),
        _ => default_variants(defaults),
    };
    let rules = record
        .rules
        .as_ref()
        .map(|rules| rules.iter().map(|r| new_rule(r, &variants)).collect())
        .unwrap_or_default();

    let (default_on, default_off) = if is_new {
        (
            record
                .default_variant_when_on
                .clone()
                .or_else(|| variants.first().map(|v| VariantRef::new(&v.id))),
            record
                .default_variant_when_off
                .clone()
                .or_else(|| variants.get(1).map(|v| VariantRef::new(&v.id))),
        )
    } else {
        (
            record
                .default_variant_when_on
                .clone()
                .or_else(|| flagged_default(record, &variants, |v| v.default_when_on)),
            record
                .default_variant_when_off
                .clone()
                .or_else(|| flagged_default(record, &variants, |v| v.default_when_off)),
        )
    };

    Flag {
        id,
        key: record.key.clone().unwrap_or_default(),
        name: record.name.clone().unwrap_or_default(),
        description: record.description.clone().unwrap_or_default(),
        enabled: record.enabled.unwrap_or(false),
        variants,
        rules,
        default_variant_when_on: default_on.filter(|r| !r.is_empty()),
        default_variant_when_off: default_off.filter(|r| !r.is_empty()),
        is_new,
    }
}

/// Older records mark defaults on the variant itself instead of on the flag.
fn flagged_default(
    record: &FlagRecord,
    variants: &[Variant],
    marker: impl Fn(&VariantRecord) -> Option<bool>,
) -> Option<VariantRef> {
    let records = record.variants.as_ref()?;
    let position = records.iter().position(|v| marker(v).unwrap_or(false))?;
    variants.get(position).map(|v| VariantRef::new(&v.id))
}

fn default_variants(defaults: &FlagDefaults) -> Vec<Variant> {
    let count = match defaults.flag_type {
        VariantType::Boolean => defaults.variant_count.clamp(1, 2),
        _ => defaults.variant_count.clamp(1, MAX_DEFAULT_VARIANTS),
    };
    (0..count)
        .map(|idx| {
            let value = match defaults.flag_type {
                VariantType::Boolean => Scalar::Bool(idx == 0),
                VariantType::Number => Scalar::Number((idx + 1) as f64),
                VariantType::String => Scalar::String(letter_label(idx)),
            };
            new_variant(&VariantRecord {
                value: Some(value),
                kind: Some(defaults.flag_type),
                ..VariantRecord::default()
            })
        })
        .collect()
}

/// "a", "b", ... "z", then "a1", "b1", ...
fn letter_label(idx: usize) -> String {
    let letter = (b'a' + (idx % 26) as u8) as char;
    match idx / 26 {
        0 => letter.to_string(),
        round => format!("{}{}", letter, round),
    }
}

pub fn new_variant(record: &VariantRecord) -> Variant {
    let (id, is_new) = identity(&record.id, record.is_new);
    let kind = record
        .kind
        .or_else(|| record.value.as_ref().map(Scalar::kind))
        .unwrap_or(VariantType::Boolean);

    Variant {
        id,
        description: record.description.clone().unwrap_or_default(),
        value: record.value.clone().unwrap_or_default(),
        kind,
        is_new,
    }
}

pub fn new_rule(record: &RuleRecord, variants: &[Variant]) -> Rule {
    let (id, is_new) = identity(&record.id, record.is_new);
    let existing = record.distributions.as_deref().unwrap_or_default();

    let distributions = variants
        .iter()
        .map(|v| match existing.iter().find(|d| targets(d, &v.id)) {
            Some(d) => new_distribution(d),
            None => new_distribution(&DistributionRecord {
                variant: Some(VariantRef::new(&v.id)),
                percentage: Some(0),
                ..DistributionRecord::default()
            }),
        })
        .collect::<Vec<_>>();

    let return_variant = derive_return_variant(&distributions, is_new);

    Rule {
        id,
        constraints: build_constraints(record.constraints.as_deref()),
        distributions,
        return_variant,
        is_new,
    }
}

fn targets(record: &DistributionRecord, variant_id: &str) -> bool {
    record.variant.as_ref().is_some_and(|r| r.id == variant_id)
}

fn build_constraints(records: Option<&[ConstraintRecord]>) -> Vec<Constraint> {
    match records {
        Some(records) if !records.is_empty() => records.iter().map(new_constraint).collect(),
        _ => vec![new_constraint(&ConstraintRecord::default())],
    }
}

pub fn new_constraint(record: &ConstraintRecord) -> Constraint {
    let (id, is_new) = identity(&record.id, record.is_new);
    let operation = record.operation.unwrap_or(Operation::OneOf);
    let values = record.values.clone().unwrap_or_default();
    let kind = if operation.is_segment_membership() {
        VariantType::String
    } else {
        record
            .kind
            .or_else(|| values.first().map(Scalar::kind))
            .unwrap_or(VariantType::String)
    };

    Constraint {
        id,
        property: record.property.clone().unwrap_or_default(),
        operation,
        values,
        kind,
        is_new,
    }
}

pub fn new_distribution(record: &DistributionRecord) -> Distribution {
    let (id, is_new) = identity(&record.id, record.is_new);
    Distribution {
        id,
        variant: record.variant.clone().unwrap_or_default(),
        percentage: record.percentage.unwrap_or(100),
        is_new,
    }
}

/// Restores the one-distribution-per-variant invariant after the flag's
/// variant set changed. Returns true when a distribution was dropped.
pub fn sync_distributions(rule: &mut Rule, variants: &[Variant]) -> bool {
    let before = rule.distributions.len();
    let mut previous = std::mem::take(&mut rule.distributions);
    let mut kept = 0;

    rule.distributions = variants
        .iter()
        .map(|v| match previous.iter().position(|d| d.variant.id == v.id) {
            Some(idx) => {
                kept += 1;
                previous.swap_remove(idx)
            }
            None => new_distribution(&DistributionRecord {
                variant: Some(VariantRef::new(&v.id)),
                percentage: Some(0),
                ..DistributionRecord::default()
            }),
        })
        .collect();
    // stale targets and duplicates both count
    let dropped = before - kept;

    if let ReturnVariant::Variant(id) = &rule.return_variant {
        if !variants.iter().any(|v| &v.id == id) {
            rule.return_variant = ReturnVariant::Unset;
        }
    }

    log::debug!(
        "rule {} distributions resynced: {} -> {}",
        rule.id,
        before,
        rule.distributions.len()
    );
    dropped > 0
}

pub fn new_segment(record: &SegmentRecord) -> Segment {
    let (id, is_new) = identity(&record.id, record.is_new);
    Segment {
        id,
        name: record.name.clone().unwrap_or_default(),
        description: record.description.clone().unwrap_or_default(),
        rules: record
            .rules
            .as_ref()
            .map(|rules| rules.iter().map(new_segment_rule).collect())
            .unwrap_or_default(),
        is_new,
    }
}

pub fn new_segment_rule(record: &SegmentRuleRecord) -> SegmentRule {
    let (id, is_new) = identity(&record.id, record.is_new);
    SegmentRule {
        id,
        constraints: build_constraints(record.constraints.as_deref()),
        is_new,
    }
}
