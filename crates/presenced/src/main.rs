use anyhow::Result;
use presence_core::InstantPolicy;
use presence_vision::null::{NullEngine, OfflineSource};
use presenced::auth::OperatorDirectory;
use presenced::scanner::{spawn_scanner, ScannerConfig};
use presenced::{AppContext, Config};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(app_id = %config.app_id, "presenced starting");

    let ctx = AppContext::init(config).await?;

    let identity = ctx.auth.sign_in(ctx.config.auth_token.as_deref()).await?;
    let directory = OperatorDirectory::new(ctx.store.clone(), &ctx.collections);
    let operator = directory.resolve(&identity).await;
    tracing::info!(
        uid = %identity.uid,
        email = %operator.email,
        role = operator.role.as_str(),
        "operator signed in"
    );

    let handle = spawn_scanner(
        ctx.store.clone(),
        ctx.collections.clone(),
        Arc::new(NullEngine::default()),
        Box::new(OfflineSource),
        Box::new(InstantPolicy),
        ScannerConfig::from(&ctx.config),
        None,
    );

    // Surface status transitions in the log until a frontend attaches.
    let mut status = handle.status();
    let status_task = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow().clone();
            tracing::info!(phase = ?current.phase, message = %current.message, "scan status");
        }
    });

    tracing::info!("presenced ready");
    tokio::signal::ctrl_c().await?;

    tracing::info!("presenced shutting down");
    handle.stop().await;
    status_task.abort();
    ctx.auth.sign_out().await?;

    Ok(())
}
