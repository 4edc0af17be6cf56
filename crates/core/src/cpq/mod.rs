pub mod catalog;
pub mod pricing;

pub use catalog::{infer_category, Catalog, CatalogQuery};
pub use pricing::{PricingEngine, PricingError, PricingResult, TieredPricingEngine};
