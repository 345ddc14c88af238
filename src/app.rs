/*
 * Responsibility
 * - Config読み込み → 依存生成 (Postgres / Valkey / 鍵 / 外部 provider) → Router 組み立て
 * - Middleware の適用 (request-id / trace / CORS / security headers)
 * - axum::serve() で起動し、SIGINT/SIGTERM で graceful shutdown
 */
use std::time::Duration;
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware;
use crate::repos::refresh_token_repo::RefreshTokenRepo;
use crate::services::auth::PgDirectory;
use crate::services::cache::{CacheClient, ValkeyClient};
use crate::services::keys::{GENERATION_LEASE_KEY, KeyManager, KeyPaths, LeaseLock};
use crate::services::oidc::ExternalProvider;
use crate::state::{AppState, StateSettings};

fn init_tracing() {
    // RUST_LOG wins; LOG_LEVEL is the short form used in container deployments.
    // Ex:
    // RUST_LOG=info,user_management=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("LOG_LEVEL")
                .map_err(|_| ())
                .and_then(|level| tracing_subscriber::EnvFilter::try_new(level).map_err(|_| ()))
        })
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // stderr can be hidden depending on how the process is launched.
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting user management in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let Some(state) = build_state(&config).await? else {
        tracing::info!("shutdown requested during startup");
        return Ok(());
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = state
        .ledger
        .clone()
        .spawn_sweeper(config.ledger_sweep_interval, shutdown_rx);

    let app = build_router(state, &config);
    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    tracing::info!("listening on {}", config.addr);

    serve(
        listener,
        app,
        shutdown_signal(),
        shutdown_tx,
        config.shutdown_grace,
    )
    .await?;

    if tokio::time::timeout(config.shutdown_grace, sweeper)
        .await
        .is_err()
    {
        tracing::warn!("refresh token sweeper did not stop within the grace period");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Serve until `signal`, then flip `shutdown` and give in-flight requests
/// `grace` to finish. Connections still open after that are dropped.
async fn serve(
    listener: TcpListener,
    app: Router,
    signal: impl Future<Output = ()> + Send + 'static,
    shutdown: watch::Sender<bool>,
    grace: Duration,
) -> Result<()> {
    let mut signalled = shutdown.subscribe();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            let _ = shutdown.send(true);
        })
        .into_future();
    tokio::pin!(server);

    let grace_elapsed = async {
        if signalled.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        served = &mut server => served.context("server error")?,
        _ = grace_elapsed => {
            tracing::warn!(?grace, "in-flight requests outlived the grace period, terminating");
        }
    }
    Ok(())
}

/// `None` when a shutdown signal arrives before startup finishes.
async fn build_state(config: &Config) -> Result<Option<AppState>> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let cache: Arc<dyn CacheClient> = Arc::new(
        ValkeyClient::new(&config.redis_uri)
            .await
            .context("failed to connect to the cache")?,
    );

    // Another replica may hold the generation lease for a while; do not make
    // SIGTERM wait on it.
    let paths = KeyPaths {
        signing: config.signing_key_path.clone(),
        encryption: config.encryption_key_path.clone(),
    };
    let lease = LeaseLock::new(cache.clone(), GENERATION_LEASE_KEY);
    let keys = tokio::select! {
        keys = KeyManager::load(&paths, &lease) => keys.context("failed to load key material")?,
        _ = shutdown_signal() => return Ok(None),
    };

    let provider = ExternalProvider::discover(&config.provider)
        .await
        .context("failed to discover the external provider")?;

    let settings = StateSettings {
        access_token_ttl: Duration::from_secs(config.access_token_ttl_seconds),
        refresh_token_ttl: Duration::from_secs(config.refresh_token_ttl_seconds),
        public_base_url: config.public_base_url.clone(),
    };

    Ok(Some(AppState::new(
        Arc::new(keys),
        Arc::new(provider),
        Arc::new(PgDirectory::new(pool.clone())),
        cache,
        Arc::new(RefreshTokenRepo::new(pool)),
        settings,
    )))
}

fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .merge(api::routes(state.clone()))
        .with_state(state);

    let router = middleware::security_headers::apply(router);
    let router = middleware::cors::apply(router, config);
    middleware::http::apply(router)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
