use std::io;

use artifact::{FsStore, Registry};
use log::{info, warn};
use tokio::{net::TcpListener, signal};

use serving::{
    Gateway, ServingConfig, frontend,
    refresh::{self, RefreshHandle},
};

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config = ServingConfig::from_env()?;
    let addr = config.addr();
    let registry = Registry::new(FsStore::new(&config.artifact_dir));
    let gateway = Gateway::new(registry, config.clone());

    info!("serving {} from {}", config.model_version, config.artifact_dir.display());
    match gateway.initialize().await {
        Ok(version) => info!(version = version.as_str(); "gateway ready"),
        Err(e) => warn!("starting degraded: {e}"),
    }

    let refresher = config
        .refresh_interval
        .map(|period| refresh::spawn(gateway.clone(), period));

    let listener = TcpListener::bind(&addr).await?;
    info!("listening at {addr}");

    tokio::select! {
        ret = frontend::serve(listener, gateway.clone()) => ret?,
        ret = refresh_on_hangup(&gateway, refresher.as_ref()) => ret?,
        _ = signal::ctrl_c() => info!("shutting down"),
    }

    if let Some(refresher) = refresher {
        refresher.shutdown().await;
    }

    Ok(())
}

/// Refreshes the gateway on every SIGHUP, through the refresh loop when there's one.
#[cfg(unix)]
async fn refresh_on_hangup(
    gateway: &Gateway<FsStore>,
    refresher: Option<&RefreshHandle>,
) -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = signal(SignalKind::hangup())?;
    while hangups.recv().await.is_some() {
        info!("received SIGHUP, refreshing");
        match refresher {
            Some(refresher) => refresher.trigger(),
            None => {
                if let Err(e) = gateway.refresh().await {
                    warn!("refresh failed: {e}");
                }
            }
        }
    }

    Ok(())
}

#[cfg(not(unix))]
async fn refresh_on_hangup(
    _gateway: &Gateway<FsStore>,
    _refresher: Option<&RefreshHandle>,
) -> io::Result<()> {
    std::future::pending().await
}
