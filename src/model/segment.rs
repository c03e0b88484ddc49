use serde::{Deserialize, Serialize};

use crate::model::{Constraint, Id};

/// Named, reusable set of constraint-only rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub rules: Vec<SegmentRule>,
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRule {
    pub id: Id,
    pub constraints: Vec<Constraint>,
    pub is_new: bool,
}
