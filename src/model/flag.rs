use serde::{Deserialize, Serialize};

use crate::model::{Constraint, Id, Scalar, VariantRef, VariantType};

/// Sentinel stored in `Rule::return_variant` when the rule is a weighted rollout.
pub const PERCENTAGE_ROLLOUT: &str = "ROLLOUT";

/// Canonical, edit-ready flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub id: Id,
    pub key: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub variants: Vec<Variant>,
    pub rules: Vec<Rule>,
    pub default_variant_when_on: Option<VariantRef>,
    pub default_variant_when_off: Option<VariantRef>,
    pub is_new: bool,
}

impl Flag {
    pub fn variant(&self, id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Resolves the variant served while the flag is enabled and no rule matches.
    pub fn default_when_on(&self) -> Option<&Variant> {
        self.default_variant_when_on
            .as_ref()
            .and_then(|r| self.variant(&r.id))
    }

    pub fn default_when_off(&self) -> Option<&Variant> {
        self.default_variant_when_off
            .as_ref()
            .and_then(|r| self.variant(&r.id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: Id,
    pub description: String,
    pub value: Scalar,
    #[serde(rename = "type")]
    pub kind: VariantType,
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: Id,
    pub constraints: Vec<Constraint>,
    pub distributions: Vec<Distribution>,
    pub return_variant: ReturnVariant,
    pub is_new: bool,
}

impl Rule {
    pub fn distribution_for(&self, variant_id: &str) -> Option<&Distribution> {
        self.distributions.iter().find(|d| d.variant.id == variant_id)
    }

    pub fn is_rollout(&self) -> bool {
        self.return_variant == ReturnVariant::Rollout
    }

    /// Sum of the in-memory percentages, shown next to a rollout for review.
    pub fn percentage_total(&self) -> u32 {
        self.distributions.iter().map(|d| d.percentage).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.percentage_total() == 100
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub id: Id,
    pub variant: VariantRef,
    pub percentage: u32,
    pub is_new: bool,
}

/// Outcome of a rule: nothing chosen yet, one fixed variant, or a rollout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReturnVariant {
    #[default]
    Unset,
    Variant(Id),
    Rollout,
}

impl ReturnVariant {
    pub fn variant_id(&self) -> Option<&str> {
        match self {
            ReturnVariant::Variant(id) => Some(id),
            _ => None,
        }
    }
}

impl From<String> for ReturnVariant {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => ReturnVariant::Unset,
            PERCENTAGE_ROLLOUT => ReturnVariant::Rollout,
            _ => ReturnVariant::Variant(value),
        }
    }
}

impl From<ReturnVariant> for String {
    fn from(value: ReturnVariant) -> Self {
        match value {
            ReturnVariant::Unset => String::new(),
            ReturnVariant::Variant(id) => id,
            ReturnVariant::Rollout => PERCENTAGE_ROLLOUT.to_string(),
        }
    }
}
