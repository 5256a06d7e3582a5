//! Cache commands - one operation against the configured backend per invocation

use tracing::info;

use super::Command;
use crate::config::AppConfig;
use crate::domain::cache::Cache;
use crate::infrastructure::logging;
use crate::infrastructure::services::CacheService;

/// Connect, run `command`, print its result and release the backend
pub async fn run(command: Command) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    let cache = CacheService::connect(&config.cache).await?;
    let result = execute(&cache, command).await;
    cache.shutdown();

    println!("{}", result?);
    Ok(())
}

/// Runs a single command and renders its result
pub async fn execute(cache: &CacheService, command: Command) -> anyhow::Result<String> {
    let output = match command {
        Command::Ping => {
            cache.ping().await?;
            "PONG".to_string()
        }
        Command::Get(args) => render_value(cache.get(&args.key, args.namespace.as_deref()).await?),
        Command::Exists(args) => cache
            .exists(&args.key, args.namespace.as_deref())
            .await?
            .to_string(),
        Command::Set(args) => {
            let target = args.target;
            cache
                .set(&target.key, &args.value, target.namespace.as_deref(), args.ttl)
                .await?
                .to_string()
        }
        Command::SetIfAbsent(args) => {
            let target = args.target;
            cache
                .set_if_absent(&target.key, &args.value, target.namespace.as_deref(), args.ttl)
                .await?
                .to_string()
        }
        Command::Remove(args) => cache
            .remove(&args.key, args.namespace.as_deref())
            .await?
            .to_string(),
        Command::Wait(args) => {
            let target = args.target;
            info!(key = %target.key, timeout_secs = args.timeout, "Waiting for change");
            render_value(
                cache
                    .wait_for_change(&target.key, args.timeout, target.namespace.as_deref())
                    .await?,
            )
        }
    };

    Ok(output)
}

fn render_value(value: Option<String>) -> String {
    value.unwrap_or_else(|| "(absent)".to_string())
}
