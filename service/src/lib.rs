use std::{future::Future, net::SocketAddr, sync::Arc};

use abi::Config;
use reservation::{BookingStore, PgStore, ReservationManager, RetryPolicy, StatusSweeper};
use tokio::{net::TcpListener, sync::watch};
use tracing::info;

mod service;
#[cfg(test)]
pub mod test_utils;

pub use service::{router, ActingUser, USER_ID_HEADER};

pub struct RsvpService<S> {
    manager: ReservationManager<S>,
    retry: RetryPolicy,
}

impl<S: BookingStore> RsvpService<S> {
    pub fn new(manager: ReservationManager<S>, retry: RetryPolicy) -> Self {
        Self { manager, retry }
    }
}

impl RsvpService<PgStore> {
    pub async fn from_config(config: &Config) -> Result<Self, anyhow::Error> {
        let store = PgStore::from_config(&config.db).await?;
        Ok(Self::new(
            ReservationManager::from_config(store, &config.booking),
            RetryPolicy::from_config(&config.booking),
        ))
    }
}

pub async fn start_server(config: &Config) -> Result<(), anyhow::Error> {
    start_server_with_shutdown(config, std::future::pending()).await
}

/// Serve until `shutdown` resolves, then stop the status sweeper as well.
pub async fn start_server_with_shutdown(
    config: &Config,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), anyhow::Error> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let svc = Arc::new(RsvpService::from_config(config).await?);

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let sweeper = if config.sweeper.enabled {
        let sweeper = StatusSweeper::from_config(svc.manager.store().clone(), &config.sweeper);
        Some(tokio::spawn(sweeper.run(async move {
            stop_rx.changed().await.ok();
        })))
    } else {
        None
    };

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "reservation service listening");
    axum::serve(listener, router(svc))
        .with_graceful_shutdown(shutdown)
        .await?;

    stop_tx.send(true).ok();
    if let Some(handle) = sweeper {
        handle.await?;
    }
    info!("reservation service stopped");
    Ok(())
}
