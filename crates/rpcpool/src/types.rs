//! Argument and result types shared by the method namespaces.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A block selector: a tag or an explicit height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockNumber {
    #[default]
    Latest,
    Earliest,
    Pending,
    Safe,
    Finalized,
    Number(u64),
}

impl std::fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Earliest => write!(f, "earliest"),
            Self::Pending => write!(f, "pending"),
            Self::Safe => write!(f, "safe"),
            Self::Finalized => write!(f, "finalized"),
            Self::Number(n) => write!(f, "{n:#x}"),
        }
    }
}

impl From<u64> for BlockNumber {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl Serialize for BlockNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<BlockNumber> for Value {
    fn from(block: BlockNumber) -> Self {
        Value::String(block.to_string())
    }
}

/// Parse a JSON-RPC quantity: `0x`-prefixed hex, or plain decimal.
pub fn parse_quantity(s: &str) -> Option<u128> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some("") => None,
        Some(hex) => u128::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Format a number as a `0x`-prefixed quantity.
pub fn to_quantity(n: u128) -> String {
    format!("{n:#x}")
}

/// Encode bytes as a `0x`-prefixed hex string.
pub fn encode_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// A numeric result as nodes return it: a hex or decimal string, or a bare
/// JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quantity(pub u128);

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let parsed = match &raw {
            Value::String(s) => parse_quantity(s),
            Value::Number(n) => n.as_u64().map(u128::from),
            _ => None,
        };
        parsed
            .map(Quantity)
            .ok_or_else(|| D::Error::custom(format!("invalid quantity: {raw}")))
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_quantity(self.0))
    }
}

impl TryFrom<Quantity> for u64 {
    type Error = std::num::TryFromIntError;

    fn try_from(q: Quantity) -> Result<Self, Self::Error> {
        u64::try_from(q.0)
    }
}
