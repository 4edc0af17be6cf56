use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EquipmentId(pub i64);

impl fmt::Display for EquipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rentable catalog item. Heights are meters, prices are in the company currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub name: String,
    pub category: String,
    pub description: String,
    pub max_height: Decimal,
    pub daily_price: Decimal,
    pub weekly_price: Option<Decimal>,
    pub monthly_price: Option<Decimal>,
    pub specifications: BTreeMap<String, String>,
    pub use_cases: Vec<String>,
    pub safety_requirements: Option<String>,
    pub available: bool,
}

impl Equipment {
    pub fn reaches(&self, height: Decimal) -> bool {
        self.max_height >= height
    }
}
