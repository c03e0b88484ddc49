use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Declared type of a variant value or constraint value list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantType {
    #[default]
    Boolean,
    Number,
    String,
}

impl std::fmt::Display for VariantType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            VariantType::Boolean => write!(f, "boolean"),
            VariantType::Number => write!(f, "number"),
            VariantType::String => write!(f, "string"),
        }
    }
}

impl std::str::FromStr for VariantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "boolean" => Ok(VariantType::Boolean),
            "number" => Ok(VariantType::Number),
            "string" => Ok(VariantType::String),
            _ => Err(format!("Unknown variant type: {}", s)),
        }
    }
}

/// A single flag or constraint value as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "WireScalar")]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    String(String),
}

// `null` is how a NaN number goes out, so it has to come back as one.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireScalar {
    Bool(bool),
    Number(f64),
    String(String),
    Null,
}

impl From<WireScalar> for Scalar {
    fn from(value: WireScalar) -> Self {
        match value {
            WireScalar::Bool(b) => Scalar::Bool(b),
            WireScalar::Number(n) => Scalar::Number(n),
            WireScalar::String(s) => Scalar::String(s),
            WireScalar::Null => Scalar::Number(f64::NAN),
        }
    }
}

// Whole numbers go out as JSON integers; NaN and infinities become null.
impl Serialize for Scalar {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
        match self {
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            Scalar::Number(n) => serializer.serialize_f64(*n),
            Scalar::String(s) => serializer.serialize_str(s),
        }
    }
}

impl Scalar {
    /// The type tag this value carries.
    pub fn kind(&self) -> VariantType {
        match self {
            Scalar::Bool(_) => VariantType::Boolean,
            Scalar::Number(_) => VariantType::Number,
            Scalar::String(_) => VariantType::String,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    /// Equality that treats two NaNs as the same value.
    pub fn same_as(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self == other,
        }
    }
}

impl Default for Scalar {
    fn default() -> Self {
        Scalar::String(String::new())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

/// Non-owning reference to a variant, resolved by id lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariantRef {
    pub id: Id,
}

impl VariantRef {
    pub fn new(id: impl Into<Id>) -> Self {
        Self { id: id.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}
