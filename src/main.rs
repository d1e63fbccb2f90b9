//! giftbox worker - runs the invoice reconciliation poller.
//!
//! Request-driven operations (reserve, redeem, read projections) are
//! invoked by the transport layer through the library API; this binary
//! owns the background side: the self-rescheduling reconciliation task.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use giftbox::config::AppConfig;
use giftbox::cryptopay::{CryptoPay, InvoiceProvider};
use giftbox::db::{Database, schema};
use giftbox::logging;
use giftbox::notify::{BotNotifier, Notifier};
use giftbox::reconcile::ReconcileTask;
use giftbox::scheduler::{self, Task};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _log_guard = logging::init_logging(&config);

    info!("Starting giftbox worker in {} mode", env);

    let db = Database::connect(&config.postgres_url).await?;
    schema::init_schema(db.pool()).await?;

    let provider: Arc<dyn InvoiceProvider> = Arc::new(CryptoPay::new(
        &config.crypto_pay.base_url,
        &config.crypto_pay.token,
    )?);
    let notifier: Arc<dyn Notifier> =
        Arc::new(BotNotifier::new(&config.bot.api_url, &config.bot.token)?);

    let tasks: Vec<Arc<dyn Task>> = vec![Arc::new(ReconcileTask::new(
        db,
        provider,
        notifier,
        config.gifts.clone(),
    ))];

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_stop_signal().await;
        info!("Received stop signal, draining tasks");
        let _ = shutdown_tx.send(true);
    });

    scheduler::run(tasks, shutdown_rx).await;

    info!("Stopped");
    Ok(())
}

async fn wait_for_stop_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
