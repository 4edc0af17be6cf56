use crate::commands::{block_on, connect, load_config, CommandResult};
use altura_db::migrations;

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let result = block_on("migrate", async {
        let pool = connect(&config).await?;
        migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5))?;
        let applied = migrations::applied_count(&pool).await.map_err(|error| ("migration", error.to_string(), 5))?;
        pool.close().await;
        Ok(applied)
    });

    match result {
        Ok(applied) => CommandResult::success(
            "migrate",
            format!("applied pending migrations ({applied}/{} recorded)", migrations::known_count()),
        ),
        Err(failure) => failure,
    }
}
