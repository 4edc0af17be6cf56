use crate::commands::{block_on, connect, load_config, CommandResult};
use altura_core::cpq::{PricingEngine, TieredPricingEngine};
use altura_core::domain::equipment::EquipmentId;
use altura_db::repositories::SqlEquipmentRepository;
use altura_db::{migrations, CatalogSeed, EquipmentRepository};

/// Prices catalog items the way the bot does, without a conversation.
pub fn run(equipment: &[i64], rental_days: u32) -> CommandResult {
    let config = match load_config("price") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let engine = TieredPricingEngine::new(
        config.pricing.tax_rate,
        config.pricing.tax_scale,
        config.company.currency.clone(),
    );
    let ids: Vec<EquipmentId> = equipment.iter().copied().map(EquipmentId).collect();

    let result = block_on("price", async {
        let pool = connect(&config).await?;
        migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5))?;
        CatalogSeed::load(&pool).await.map_err(|error| ("seed_execution", error.to_string(), 5))?;

        let items = SqlEquipmentRepository::new(pool.clone())
            .find_many(&ids)
            .await
            .map_err(|error| ("equipment_lookup", error.to_string(), 7));
        pool.close().await;

        engine.price(&items?, rental_days).map_err(|error| ("pricing", error.to_string(), 8))
    });

    match result {
        Ok(priced) => {
            let message = format!(
                "{} item(s) for {rental_days} day(s): subtotal {}, tax {}, total {} {}",
                priced.lines.len(),
                priced.subtotal,
                priced.tax,
                priced.total,
                priced.trace.currency
            );
            CommandResult::success_with_data("price", message, serde_json::to_value(&priced).ok())
        }
        Err(failure) => failure,
    }
}
