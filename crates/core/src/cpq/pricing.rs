use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::equipment::Equipment;
use crate::domain::quotation::{QuotationLine, RateTier};

const DAYS_PER_MONTH: u32 = 30;
const DAYS_PER_WEEK: u32 = 7;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTrace {
    pub currency: String,
    pub steps: Vec<PricingTraceStep>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub lines: Vec<QuotationLine>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub trace: PricingTrace,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("no equipment selected for pricing")]
    EmptySelection,
    #[error("rental days must be at least 1, got {0}")]
    InvalidRentalDays(u32),
}

pub trait PricingEngine: Send + Sync {
    fn price(&self, equipment: &[Equipment], rental_days: u32) -> Result<PricingResult, PricingError>;
}

/// Monthly, then weekly, then daily tiers with a flat VAT on the subtotal.
#[derive(Clone, Debug)]
pub struct TieredPricingEngine {
    tax_rate: Decimal,
    tax_scale: u32,
    currency: String,
}

impl TieredPricingEngine {
    pub fn new(tax_rate: Decimal, tax_scale: u32, currency: impl Into<String>) -> Self {
        Self { tax_rate, tax_scale, currency: currency.into() }
    }
}

impl Default for TieredPricingEngine {
    fn default() -> Self {
        Self::new(Decimal::new(19, 2), 0, "COP")
    }
}

impl PricingEngine for TieredPricingEngine {
    fn price(&self, equipment: &[Equipment], rental_days: u32) -> Result<PricingResult, PricingError> {
        if equipment.is_empty() {
            return Err(PricingError::EmptySelection);
        }
        if rental_days == 0 {
            return Err(PricingError::InvalidRentalDays(rental_days));
        }

        let mut steps = Vec::with_capacity(equipment.len() + 2);
        let lines: Vec<QuotationLine> = equipment
            .iter()
            .map(|item| {
                let (tier, amount) = price_item(item, rental_days);
                steps.push(PricingTraceStep {
                    stage: format!("line:{}", item.id),
                    detail: tier_detail(item, tier, rental_days),
                    amount,
                });
                QuotationLine {
                    equipment_id: item.id,
                    name: item.name.clone(),
                    rental_days,
                    tier,
                    daily_price: item.daily_price,
                    amount,
                }
            })
            .collect();

        let subtotal: Decimal = lines.iter().map(|line| line.amount).sum();
        let tax = tax_for(subtotal, self.tax_rate, self.tax_scale);
        let total = subtotal + tax;

        steps.push(PricingTraceStep {
            stage: "tax".to_string(),
            detail: format!("round(subtotal * {}, {})", self.tax_rate, self.tax_scale),
            amount: tax,
        });
        steps.push(PricingTraceStep {
            stage: "total".to_string(),
            detail: "subtotal + tax".to_string(),
            amount: total,
        });

        Ok(PricingResult {
            lines,
            subtotal,
            tax_rate: self.tax_rate,
            tax,
            total,
            trace: PricingTrace { currency: self.currency.clone(), steps },
        })
    }
}

/// Price of one item over `rental_days`, with the tier that produced it.
pub fn price_item(item: &Equipment, rental_days: u32) -> (RateTier, Decimal) {
    let days = Decimal::from(rental_days);
    match (item.monthly_price, item.weekly_price) {
        (Some(monthly), _) if rental_days >= DAYS_PER_MONTH => {
            let months = Decimal::from(rental_days / DAYS_PER_MONTH);
            let rest = Decimal::from(rental_days % DAYS_PER_MONTH);
            (RateTier::Monthly, months * monthly + rest * item.daily_price)
        }
        (_, Some(weekly)) if rental_days >= DAYS_PER_WEEK => {
            let weeks = Decimal::from(rental_days / DAYS_PER_WEEK);
            let rest = Decimal::from(rental_days % DAYS_PER_WEEK);
            (RateTier::Weekly, weeks * weekly + rest * item.daily_price)
        }
        _ => (RateTier::Daily, days * item.daily_price),
    }
}

pub fn tax_for(subtotal: Decimal, tax_rate: Decimal, scale: u32) -> Decimal {
    (subtotal * tax_rate).round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

fn tier_detail(item: &Equipment, tier: RateTier, rental_days: u32) -> String {
    match tier {
        RateTier::Monthly => format!(
            "{} x monthly + {} x daily {}",
            rental_days / DAYS_PER_MONTH,
            rental_days % DAYS_PER_MONTH,
            item.daily_price
        ),
        RateTier::Weekly => format!(
            "{} x weekly + {} x daily {}",
            rental_days / DAYS_PER_WEEK,
            rental_days % DAYS_PER_WEEK,
            item.daily_price
        ),
        RateTier::Daily => format!("{rental_days} x daily {}", item.daily_price),
    }
}
