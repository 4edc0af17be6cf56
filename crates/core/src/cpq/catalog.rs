use rust_decimal::Decimal;

use crate::domain::equipment::{Equipment, EquipmentId};
use crate::text::{contains_any, fold};

/// Filter for catalog lookups. Both criteria are optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub min_height: Option<Decimal>,
}

/// Read-only equipment catalog shared by every conversation.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    items: Vec<Equipment>,
}

impl Catalog {
    pub fn new(items: Vec<Equipment>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: EquipmentId) -> Option<&Equipment> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Available items matching the query, shortest adequate reach first, then cheapest.
    pub fn find(&self, query: &CatalogQuery) -> Vec<&Equipment> {
        let category = query.category.as_deref().map(str::to_lowercase);
        let mut matches: Vec<&Equipment> = self
            .items
            .iter()
            .filter(|item| item.available)
            .filter(|item| {
                category.as_deref().map_or(true, |wanted| item.category.to_lowercase() == wanted)
            })
            .filter(|item| query.min_height.map_or(true, |height| item.reaches(height)))
            .collect();

        matches.sort_by(|left, right| {
            left.max_height
                .cmp(&right.max_height)
                .then_with(|| left.daily_price.cmp(&right.daily_price))
                .then_with(|| left.id.cmp(&right.id))
        });
        matches
    }
}

/// Category guess used when the customer did not name an equipment family.
pub fn infer_category(work_type: Option<&str>, height: Option<Decimal>) -> &'static str {
    let work = work_type.map(fold).unwrap_or_default();
    let height = height.unwrap_or(Decimal::ZERO);

    if contains_any(&work, &["pintura", "mantenimiento", "limpieza"]) && height <= Decimal::from(3) {
        "escaleras"
    } else if contains_any(&work, &["construccion", "obra"]) && height <= Decimal::from(8) {
        "andamios"
    } else if height > Decimal::from(8) {
        "elevadores"
    } else {
        "andamios"
    }
}
