use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    Percentage,
    Fixed,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Percentage => "percentage",
            ChargeType::Fixed => "fixed",
        }
    }
}

impl FromStr for ChargeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(ChargeType::Percentage),
            "fixed" => Ok(ChargeType::Fixed),
            other => Err(format!("unknown charge type '{}'", other)),
        }
    }
}

/// A configurable fee. For `Percentage`, `value` is a percent (18 means 18%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRule {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub charge_type: ChargeType,
    pub value: Decimal,
    pub description: Option<String>,
    pub active: bool,
}

impl ChargeRule {
    pub fn new(name: impl Into<String>, charge_type: ChargeType, value: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            charge_type,
            value,
            description: None,
            active: true,
        }
    }
}
