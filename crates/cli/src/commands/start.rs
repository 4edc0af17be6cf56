use crate::commands::{block_on, connect, load_config, CommandResult};
use altura_db::migrations;

/// Startup preflight for `altura-server`. Reads only; migrations are applied by the server.
pub fn run() -> CommandResult {
    let config = match load_config("start") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    if !config.telegram.has_token() {
        return CommandResult::failure(
            "start",
            "config_validation",
            "telegram.bot_token is not set (ALTURA_TELEGRAM_BOT_TOKEN)",
            2,
        );
    }

    let result = block_on("start", async {
        let pool = connect(&config).await?;
        let applied = migrations::applied_count(&pool)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4))?;
        pool.close().await;
        Ok(applied)
    });

    match result {
        Ok(applied) => {
            let known = migrations::known_count();
            let pending = known.saturating_sub(usize::try_from(applied).unwrap_or(0));
            let llm = if config.llm.has_api_key() {
                format!("llm {} ready", config.llm.provider.as_str())
            } else {
                format!("llm {} api key not set", config.llm.provider.as_str())
            };
            CommandResult::success(
                "start",
                format!("preflight passed: database reachable, {pending} pending migration(s), {llm}"),
            )
        }
        Err(failure) => failure,
    }
}
