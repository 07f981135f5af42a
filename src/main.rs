//! Wiring & DI. Entry point: load config, pick adapters, inject into services, serve HTTP.
//! No business logic here.

use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use dat_dispatch::adapters::http::{AppState, Gateways, router};
use dat_dispatch::adapters::integrations::{BitlyShortener, GoogleStaticMaps, MockShortener};
use dat_dispatch::adapters::mail::{MailgunMailer, MockMailer};
use dat_dispatch::adapters::persistence::SqliteRepo;
use dat_dispatch::adapters::sms::{MockSmsGateway, TwilioGateway};
use dat_dispatch::ports::{Mailer, MapProvider, SmsGateway, UrlShortener};
use dat_dispatch::shared::AppConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (check CWD)"),
    }

    let cfg = AppConfig::load().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let data_path = PathBuf::from(cfg.data_dir_or_default());
    let repo = Arc::new(
        SqliteRepo::connect(&data_path)
            .await
            .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?,
    );
    info!(path = %data_path.display(), "database ready");

    // --- Gateways: real when configured, otherwise logging mocks ---
    let sms: Arc<dyn SmsGateway> = if cfg.is_twilio_configured() {
        info!("Twilio SMS gateway enabled");
        Arc::new(TwilioGateway::new(
            cfg.twilio_account_sid.clone().unwrap_or_default(),
            cfg.twilio_auth_token.clone().unwrap_or_default(),
            cfg.twilio_from_number.clone().unwrap_or_default(),
        ))
    } else {
        warn!("Twilio not configured, using mock SMS gateway");
        Arc::new(MockSmsGateway::new())
    };

    let mailer: Arc<dyn Mailer> = if cfg.is_mailgun_configured() {
        info!("Mailgun mailer enabled");
        Arc::new(MailgunMailer::new(
            cfg.mailgun_domain.clone().unwrap_or_default(),
            cfg.mailgun_api_key.clone().unwrap_or_default(),
        ))
    } else {
        warn!("Mailgun not configured, using mock mailer");
        Arc::new(MockMailer::new())
    };

    let shortener: Arc<dyn UrlShortener> = if cfg.is_bitly_configured() {
        Arc::new(BitlyShortener::new(cfg.bitly_token.clone().unwrap_or_default()))
    } else {
        warn!("Bitly not configured, using mock shortener");
        Arc::new(MockShortener::new())
    };

    let maps: Arc<dyn MapProvider> = Arc::new(GoogleStaticMaps::new(cfg.maps_api_key()));

    let state = AppState::new(
        repo,
        Gateways {
            sms,
            mailer,
            shortener,
            maps,
            mail_from: cfg.mail_from_or_default(),
        },
    );

    let bind_addr = cfg.bind_addr_or_default();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("bind {}: {}", bind_addr, e))?;
    info!(addr = %bind_addr, "dat-dispatch listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await?;

    Ok(())
}
