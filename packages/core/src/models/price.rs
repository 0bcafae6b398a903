//! Ingredient prices
//!
//! Prices are listed per unit of measure. Converting between units is an
//! external concern (`services::UnitConverter`); this module only carries the
//! data.

use crate::models::IngredientId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of measure a price is quoted in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Ml,
    Cl,
    Oz,
    Dash,
    Piece,
    /// Any unit the converter understands but this enum does not name
    Other(String),
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Ml => f.write_str("ml"),
            Unit::Cl => f.write_str("cl"),
            Unit::Oz => f.write_str("oz"),
            Unit::Dash => f.write_str("dash"),
            Unit::Piece => f.write_str("piece"),
            Unit::Other(name) => f.write_str(name),
        }
    }
}

/// Price of `amount` units of an ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientPrice {
    pub ingredient_id: IngredientId,
    /// Price in minor currency units (cents)
    pub price: i64,
    pub currency: String,
    pub amount: f64,
    pub unit: Unit,
}

impl IngredientPrice {
    /// Price of a single unit, in minor currency units
    pub fn per_unit(&self) -> Option<f64> {
        if self.amount > 0.0 {
            Some(self.price as f64 / self.amount)
        } else {
            None
        }
    }
}
