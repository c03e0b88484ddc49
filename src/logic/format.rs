//! Wire formatter: projects the edited canonical model back to the payloads
//! the persistence layer accepts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ModelError, ModelResult};
use crate::logic::cast::cast;
use crate::model::{
    Constraint, ConstraintInput, Distribution, DistributionInput, Flag, FlagInput, Id,
    NewFlagInput, ReturnVariant, Rule, RuleInput, Segment, SegmentInput, SegmentRule,
    SegmentRuleInput, Variant, VariantInput, VariantRef,
};

/// Local variant id -> id assigned by the persistence layer on creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantIdRemap {
    ids: HashMap<Id, Id>,
}

impl VariantIdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, local: impl Into<Id>, persisted: impl Into<Id>) {
        self.ids.insert(local.into(), persisted.into());
    }

    /// Unmapped ids belong to variants that were already persisted.
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        self.ids.get(id).map(String::as_str).unwrap_or(id)
    }
}

/// Checks applied before a payload is produced. Lenient mode sends whatever
/// the editor holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub enforce_balanced_rollouts: bool,
    pub reject_dangling_defaults: bool,
    pub reject_incomplete_constraints: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

impl ValidationPolicy {
    pub fn strict() -> Self {
        Self {
            enforce_balanced_rollouts: true,
            reject_dangling_defaults: true,
            reject_incomplete_constraints: true,
        }
    }

    pub fn lenient() -> Self {
        Self {
            enforce_balanced_rollouts: false,
            reject_dangling_defaults: false,
            reject_incomplete_constraints: false,
        }
    }
}

pub fn format_new_flag(flag: &Flag) -> NewFlagInput {
    NewFlagInput {
        key: flag.key.clone(),
        name: flag.name.clone(),
        description: flag.description.clone(),
    }
}

pub fn format_flag(
    flag: &Flag,
    remap: &VariantIdRemap,
    policy: &ValidationPolicy,
) -> ModelResult<FlagInput> {
    if policy.reject_dangling_defaults {
        check_default(flag, flag.default_variant_when_on.as_ref(), "when on")?;
        check_default(flag, flag.default_variant_when_off.as_ref(), "when off")?;
    }
    let resolve = |r: &Option<VariantRef>| r.as_ref().map(|r| remap.resolve(&r.id).to_string());

    Ok(FlagInput {
        key: flag.key.clone(),
        name: flag.name.clone(),
        description: flag.description.clone(),
        enabled: flag.enabled,
        default_variant_when_on: resolve(&flag.default_variant_when_on),
        default_variant_when_off: resolve(&flag.default_variant_when_off),
    })
}

fn check_default(flag: &Flag, default: Option<&VariantRef>, slot: &'static str) -> ModelResult<()> {
    match default {
        Some(r) if flag.variant(&r.id).is_none() => Err(ModelError::DanglingDefaultVariant {
            slot,
            variant_id: r.id.clone(),
        }),
        _ => Ok(()),
    }
}

pub fn format_variant(variant: &Variant) -> VariantInput {
    VariantInput {
        description: variant.description.clone(),
        value: cast(&variant.value, variant.kind),
    }
}

/// Formats a flag rule. A deterministic rule always goes out as 100% on its
/// return variant and 0% elsewhere, whatever percentages the editor held.
pub fn format_rule(
    rule: &Rule,
    remap: &VariantIdRemap,
    policy: &ValidationPolicy,
) -> ModelResult<RuleInput> {
    let distributions = match &rule.return_variant {
        ReturnVariant::Rollout => {
            if policy.enforce_balanced_rollouts {
                check_rollout(rule)?;
            }
            rule.distributions
                .iter()
                .map(|d| format_distribution(d, d.percentage, remap))
                .collect()
        }
        ReturnVariant::Variant(id) => {
            if policy.enforce_balanced_rollouts && rule.distribution_for(id).is_none() {
                return Err(ModelError::UnknownVariant(id.clone()));
            }
            rule.distributions
                .iter()
                .map(|d| format_distribution(d, if &d.variant.id == id { 100 } else { 0 }, remap))
                .collect()
        }
        ReturnVariant::Unset => {
            if policy.enforce_balanced_rollouts {
                return Err(ModelError::MissingReturnVariant(rule.id.clone()));
            }
            rule.distributions
                .iter()
                .map(|d| format_distribution(d, 0, remap))
                .collect()
        }
    };

    if policy.reject_incomplete_constraints {
        check_constraints(&rule.id, &rule.constraints)?;
    }

    Ok(RuleInput {
        constraints: rule.constraints.iter().map(format_constraint).collect(),
        distributions,
    })
}

/// Every constraint must name its property (or segment) and carry values
/// when its operation reads them.
fn check_constraints(rule_id: &str, constraints: &[Constraint]) -> ModelResult<()> {
    match constraints.iter().find(|c| !c.is_complete()) {
        Some(c) => Err(ModelError::IncompleteConstraint {
            rule_id: rule_id.to_string(),
            constraint_id: c.id.clone(),
        }),
        None => Ok(()),
    }
}

fn check_rollout(rule: &Rule) -> ModelResult<()> {
    if let Some(d) = rule.distributions.iter().find(|d| d.percentage > 100) {
        return Err(ModelError::PercentageOutOfRange {
            rule_id: rule.id.clone(),
            variant_id: d.variant.id.clone(),
            percentage: d.percentage,
        });
    }
    let total = rule.percentage_total();
    if total != 100 {
        return Err(ModelError::UnbalancedRollout {
            rule_id: rule.id.clone(),
            total,
        });
    }
    Ok(())
}

pub fn format_constraint(constraint: &Constraint) -> ConstraintInput {
    ConstraintInput {
        property: constraint.property.clone(),
        operation: constraint.operation,
        values: constraint
            .values
            .iter()
            .map(|v| cast(v, constraint.kind))
            .collect(),
    }
}

pub fn format_distribution(
    distribution: &Distribution,
    percentage: u32,
    remap: &VariantIdRemap,
) -> DistributionInput {
    DistributionInput {
        variant_id: remap.resolve(&distribution.variant.id).to_string(),
        percentage,
    }
}

pub fn format_segment(segment: &Segment) -> SegmentInput {
    SegmentInput {
        name: segment.name.clone(),
        description: segment.description.clone(),
    }
}

pub fn format_segment_rule(
    rule: &SegmentRule,
    policy: &ValidationPolicy,
) -> ModelResult<SegmentRuleInput> {
    if policy.reject_incomplete_constraints {
        check_constraints(&rule.id, &rule.constraints)?;
    }
    Ok(SegmentRuleInput {
        constraints: rule.constraints.iter().map(format_constraint).collect(),
    })
}

/// Runs every check `format_flag` and `format_rule` would, without building payloads.
pub fn validate_flag(flag: &Flag, policy: &ValidationPolicy) -> ModelResult<()> {
    let remap = VariantIdRemap::new();
    format_flag(flag, &remap, policy)?;
    for rule in &flag.rules {
        format_rule(rule, &remap, policy)?;
    }
    Ok(())
}

pub fn validate_segment(segment: &Segment, policy: &ValidationPolicy) -> ModelResult<()> {
    for rule in &segment.rules {
        format_segment_rule(rule, policy)?;
    }
    Ok(())
}
