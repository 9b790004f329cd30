//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run the
//! update poller. No business logic here.

use std::path::PathBuf;
use std::sync::Arc;

use dotenv::dotenv;
use tg_repost::adapters::persistence::JobStoreJson;
use tg_repost::adapters::telegram::{BotApiGateway, UpdatePoller};
use tg_repost::ports::{InputPort, JobStorePort, MessagingGateway};
use tg_repost::shared::config::AppConfig;
use tg_repost::usecases::{DialogueEngine, DispatchService, SchedulerService};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = &env_loaded {
        info!(path = %path.display(), "loaded .env");
    }

    let cfg = AppConfig::load().unwrap_or_default();
    let token = match cfg.bot_token() {
        Some(t) => t,
        None => anyhow::bail!(
            "Set TG_REPOST_BOT_TOKEN or TELEGRAM_BOT_TOKEN (env or .env). Get one from @BotFather"
        ),
    };

    let tz = cfg.timezone_or_default();
    info!(%tz, "scheduling timezone");

    let data_path = PathBuf::from(cfg.data_dir_or_default());
    tokio::fs::create_dir_all(&data_path)
        .await
        .map_err(|e| anyhow::anyhow!("create data dir: {}", e))?;
    info!(path = %data_path.display(), "data directory");

    // --- Persistence: load the job registry before anything can fire ---
    let store_impl = JobStoreJson::new(data_path.join("jobs.json"));
    store_impl
        .load()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let store: Arc<dyn JobStorePort> = Arc::new(store_impl);

    // --- Telegram gateway ---
    let gateway: Arc<dyn MessagingGateway> = Arc::new(BotApiGateway::new(
        &token,
        cfg.poll_timeout_secs_or_default(),
    ));

    // --- Services ---
    let dispatcher = Arc::new(DispatchService::new(Arc::clone(&gateway)));

    let (mut scheduler, scheduler_handle) = SchedulerService::new(Arc::clone(&dispatcher), tz);
    let recovered = scheduler
        .recover(store.as_ref())
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    info!(recovered, "jobs restored from registry");
    tokio::spawn(async move {
        scheduler.run().await;
    });

    let engine = Arc::new(DialogueEngine::new(
        Arc::clone(&gateway),
        Arc::clone(&store),
        scheduler_handle,
        Arc::clone(&dispatcher),
    ));

    // --- Run (long-poll loop; returns only on unrecoverable input error) ---
    let input_port: Arc<dyn InputPort> = Arc::new(UpdatePoller::new(gateway, engine));
    input_port
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
