use thiserror::Error;

use crate::model::Id;

/// Failures raised while editing or formatting the flag model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("variant '{0}' does not exist on this flag")]
    UnknownVariant(Id),
    #[error("rule '{0}' does not exist")]
    UnknownRule(Id),
    #[error("constraint '{constraint_id}' does not exist on rule '{rule_id}'")]
    UnknownConstraint { rule_id: Id, constraint_id: Id },
    #[error("rollout rule '{rule_id}' distributes {total}% instead of 100%")]
    UnbalancedRollout { rule_id: Id, total: u32 },
    #[error("distribution for variant '{variant_id}' on rule '{rule_id}' is {percentage}%, above 100%")]
    PercentageOutOfRange {
        rule_id: Id,
        variant_id: Id,
        percentage: u32,
    },
    #[error("constraint '{constraint_id}' on rule '{rule_id}' is missing its property or values")]
    IncompleteConstraint { rule_id: Id, constraint_id: Id },
    #[error("rule '{0}' has no return variant selected")]
    MissingReturnVariant(Id),
    #[error("default variant '{variant_id}' ({slot}) is not one of the flag's variants")]
    DanglingDefaultVariant { slot: &'static str, variant_id: Id },
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
