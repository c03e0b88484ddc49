use serde::{Deserialize, Serialize};

/// Comparison applied by a constraint between a request property and its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    #[default]
    OneOf,
    NotOneOf,
    Greater,
    GreaterOrEqual,
    Lower,
    LowerOrEqual,
    Exists,
    DoesntExist,
    Contains,
    DoesntContain,
    StartsWith,
    DoesntStartWith,
    EndsWith,
    DoesntEndWith,
    MatchesRegex,
    DoesntMatchRegex,
    BeforeDate,
    BeforeOrSameDate,
    AfterDate,
    AfterOrSameDate,
    IsInSegment,
    IsntInSegment,
    IsInNetwork,
}

impl Operation {
    pub const ALL: [Operation; 23] = [
        Operation::OneOf,
        Operation::NotOneOf,
        Operation::Greater,
        Operation::GreaterOrEqual,
        Operation::Lower,
        Operation::LowerOrEqual,
        Operation::Exists,
        Operation::DoesntExist,
        Operation::Contains,
        Operation::DoesntContain,
        Operation::StartsWith,
        Operation::DoesntStartWith,
        Operation::EndsWith,
        Operation::DoesntEndWith,
        Operation::MatchesRegex,
        Operation::DoesntMatchRegex,
        Operation::BeforeDate,
        Operation::BeforeOrSameDate,
        Operation::AfterDate,
        Operation::AfterOrSameDate,
        Operation::IsInSegment,
        Operation::IsntInSegment,
        Operation::IsInNetwork,
    ];

    /// Segment-membership operations carry a segment id in `values[0]`
    /// instead of reading a request property.
    pub fn is_segment_membership(self) -> bool {
        matches!(self, Operation::IsInSegment | Operation::IsntInSegment)
    }

    pub fn requires_property(self) -> bool {
        !self.is_segment_membership()
    }

    /// Existence checks ignore the value list.
    pub fn takes_values(self) -> bool {
        !matches!(self, Operation::Exists | Operation::DoesntExist)
    }

    pub fn label(self) -> &'static str {
        match self {
            Operation::OneOf => "Equals any",
            Operation::NotOneOf => "Not equals any",
            Operation::Greater => "Greater",
            Operation::GreaterOrEqual => "Greater or equal",
            Operation::Lower => "Lower",
            Operation::LowerOrEqual => "Lower or equal",
            Operation::Exists => "Exists",
            Operation::DoesntExist => "Doesn't exist",
            Operation::Contains => "Contains",
            Operation::DoesntContain => "Doesn't contain",
            Operation::StartsWith => "Starts with",
            Operation::DoesntStartWith => "Doesn't start with",
            Operation::EndsWith => "Ends with",
            Operation::DoesntEndWith => "Doesn't end with",
            Operation::MatchesRegex => "Matches regex",
            Operation::DoesntMatchRegex => "Doesn't match regex",
            Operation::BeforeDate => "Before date",
            Operation::BeforeOrSameDate => "Before or same date",
            Operation::AfterDate => "After date",
            Operation::AfterOrSameDate => "After or same date",
            Operation::IsInSegment => "Is in segment",
            Operation::IsntInSegment => "Isn't in segment",
            Operation::IsInNetwork => "Is in network",
        }
    }
}

/// Operation name paired with its display label, as listed to the console.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub name: Operation,
    pub label: &'static str,
}

pub fn list_operations() -> Vec<OperationDescriptor> {
    Operation::ALL
        .iter()
        .map(|op| OperationDescriptor {
            name: *op,
            label: op.label(),
        })
        .collect()
}
