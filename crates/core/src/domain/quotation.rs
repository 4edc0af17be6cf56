use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::equipment::EquipmentId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotationId(pub String);

/// Rate tier applied to a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTier {
    Monthly,
    Weekly,
    Daily,
}

impl RateTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::Daily => "daily",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationLine {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub rental_days: u32,
    pub tier: RateTier,
    pub daily_price: Decimal,
    pub amount: Decimal,
}

/// Priced snapshot for a selection of equipment over a rental period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub rental_days: u32,
    pub currency: String,
    pub lines: Vec<QuotationLine>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Quotation {
    pub fn equipment_ids(&self) -> Vec<EquipmentId> {
        self.lines.iter().map(|line| line.equipment_id).collect()
    }

    /// True when this snapshot was priced for exactly this selection and duration.
    pub fn covers(&self, equipment_ids: &[EquipmentId], rental_days: u32) -> bool {
        self.rental_days == rental_days && self.equipment_ids() == equipment_ids
    }
}

/// Rendered quotation artifact handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference {
    pub file_name: String,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::equipment::EquipmentId;

    use super::{Quotation, QuotationId, QuotationLine, RateTier};

    #[test]
    fn covers_detects_changed_selection_or_duration() {
        let quotation = Quotation {
            id: QuotationId("COT-1".to_owned()),
            rental_days: 10,
            currency: "COP".to_owned(),
            lines: vec![QuotationLine {
                equipment_id: EquipmentId(1),
                name: "Andamio Multidireccional 6m".to_owned(),
                rental_days: 10,
                tier: RateTier::Weekly,
                daily_price: Decimal::from(45_000),
                amount: Decimal::from(405_000),
            }],
            subtotal: Decimal::from(405_000),
            tax_rate: Decimal::new(19, 2),
            tax: Decimal::from(76_950),
            total: Decimal::from(481_950),
            created_at: Utc::now(),
        };

        assert!(quotation.covers(&[EquipmentId(1)], 10));
        assert!(!quotation.covers(&[EquipmentId(1)], 14));
        assert!(!quotation.covers(&[EquipmentId(1), EquipmentId(2)], 10));
    }
}
