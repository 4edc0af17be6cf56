use crate::commands::{block_on, connect, load_config, CommandResult};
use altura_db::{migrations, CatalogSeed};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let result = block_on("seed", async {
        let pool = connect(&config).await?;
        migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5))?;

        let seeded = CatalogSeed::load(&pool).await.map_err(|error| ("seed_execution", error.to_string(), 5))?;
        let verification =
            CatalogSeed::verify(&pool).await.map_err(|error| ("seed_verification", error.to_string(), 6))?;
        pool.close().await;

        if verification.all_present {
            Ok(seeded)
        } else {
            Err(("seed_verification", verification_message(&verification.missing()), 6))
        }
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!("equipment catalog ready: {} inserted, {} present", seeded.inserted, seeded.total),
        ),
        Err(failure) => failure,
    }
}

fn verification_message(missing: &[&str]) -> String {
    if missing.is_empty() {
        "some catalog items failed to load".to_string()
    } else {
        format!("catalog verification failed for: {}", missing.join(", "))
    }
}
