use procura_core::config::{AppConfig, LoadOptions};
use procura_db::migrations::{self, AppliedMigration};
use procura_db::{connect_with_settings, PoolSettings};
use serde_json::json;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            PoolSettings::new(config.database.max_connections, config.database.timeout_secs),
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let applied = migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<Vec<AppliedMigration>, (&'static str, String, u8)>(applied)
    });

    match result {
        Ok(applied) if applied.is_empty() => {
            CommandResult::success("migrate", "no pending migrations")
        }
        Ok(applied) => {
            let summary = applied
                .iter()
                .map(|migration| format!("{:04} {}", migration.version, migration.description))
                .collect::<Vec<_>>()
                .join(", ");
            let details = json!({
                "applied": applied
                    .iter()
                    .map(|migration| json!({
                        "version": migration.version,
                        "description": migration.description,
                    }))
                    .collect::<Vec<_>>(),
            });
            CommandResult::success_with_details(
                "migrate",
                format!("applied {} migration(s): {summary}", applied.len()),
                details,
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
