mod config;
mod handlers;
mod logging;
mod sink;
mod telegram;
#[cfg(test)]
mod testing;

use chart_renderer::CandleChartRenderer;
use config::BotConfig;
use gemini_client::GeminiClient;
use handlers::BotHandler;
use krx_client::KrxClient;
use market_map::MarketMapCapturer;
use report_orchestrator::ReportOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use telegram::TelegramClient;
use tokio::signal::unix::SignalKind;
use tokio::sync::Semaphore;

const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = BotConfig::from_env()?;
    logging::init(config.secrets());
    tracing::debug!("Loaded {:?}", config);

    let krx = match &config.krx_api_url {
        Some(url) => KrxClient::with_base_url(url.clone()),
        None => KrxClient::new(),
    };
    let orchestrator = Arc::new(ReportOrchestrator::new(
        Arc::new(krx),
        Arc::new(CandleChartRenderer::default()),
        Arc::new(GeminiClient::new(config.gemini_config())),
        Arc::new(MarketMapCapturer::chromium(config.market_map_settings())),
        config.report_config(),
    ));

    let telegram = Arc::new(TelegramClient::new(&config.telegram_token)?);
    let handler = Arc::new(BotHandler::new(telegram.clone(), orchestrator));
    let permits = Arc::new(Semaphore::new(config.max_concurrent));

    let mut offset = telegram.drop_pending_updates().await?;
    tracing::info!(
        "KRX report bot polling (max {} concurrent requests)",
        config.max_concurrent
    );

    // Graceful shutdown: SIGINT + SIGTERM
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;

    loop {
        let updates = tokio::select! {
            result = telegram.get_updates(offset, config.poll_timeout_secs) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down bot...");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down bot...");
                break;
            }
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!("getUpdates failed, retrying in {:?}: {}", POLL_RETRY_DELAY, e);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            let handler = handler.clone();
            let permits = permits.clone();
            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                handler.handle_update(update).await;
            });
        }
    }

    // Let in-flight requests finish before exiting
    let all = config.max_concurrent as u32;
    if tokio::time::timeout(SHUTDOWN_GRACE, permits.acquire_many(all)).await.is_err() {
        tracing::warn!("Shutdown grace period elapsed with requests still running");
    }
    permits.close();
    tracing::info!("Bot shut down.");

    Ok(())
}
