use serde::{Deserialize, Serialize};

use crate::model::{Id, Operation, Scalar, VariantType};

/// A single predicate a rule requires to hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub id: Id,
    pub property: String,
    pub operation: Operation,
    pub values: Vec<Scalar>,
    #[serde(rename = "type")]
    pub kind: VariantType,
    pub is_new: bool,
}

impl Constraint {
    /// Segment id referenced by a segment-membership constraint.
    pub fn segment_id(&self) -> Option<&str> {
        if !self.operation.is_segment_membership() {
            return None;
        }
        self.values.first().and_then(Scalar::as_str)
    }

    /// A constraint is complete when it names a property (or a segment for
    /// membership checks) and has values when its operation needs them.
    pub fn is_complete(&self) -> bool {
        if !self.operation.requires_property() {
            return self.segment_id().is_some_and(|s| !s.is_empty());
        }
        !self.property.is_empty() && (!self.operation.takes_values() || !self.values.is_empty())
    }
}
