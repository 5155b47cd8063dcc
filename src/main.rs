use actix_web::web::Data;
use actix_web::{App, HttpServer};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

use quire::browser::ChromiumDriver;
use quire::config::Environment;
use quire::generate::GeneratePdfUrl;
use quire::pool::{PagePool, PoolLimits};
use quire::render::RenderPipeline;
use quire::server::{routes, AppState};
use quire::services::cache::RedisUrlCache;
use quire::services::storage::S3ArtifactStore;
use quire::telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let env = match Environment::from_env() {
        Ok(env) => env,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    telemetry::init(&env);

    let cache = match RedisUrlCache::connect(&env.redis_url()).await {
        Ok(cache) => Arc::new(cache),
        Err(err) => {
            log::error!("unable to connect to redis: {err}");
            std::process::exit(1);
        }
    };

    let storage = Arc::new(S3ArtifactStore::new(&env));

    let pool = PagePool::new(
        ChromiumDriver::new(&env.chromium_binary_path),
        PoolLimits {
            max_browsers: env.max_chromium_browsers,
            max_pages_per_browser: env.max_chromium_tabs_per_browser,
            page_idle_timeout: std::time::Duration::from_secs(env.max_chromium_tab_idle_seconds),
        },
    );

    let renderer = Arc::new(RenderPipeline::new(pool.clone()));
    let generate = Arc::new(GeneratePdfUrl::new(renderer, storage, cache));

    let state = Data::new(AppState {
        generate,
        auth_secret: env.auth_secret.clone(),
    });

    log::info!("listening on 0.0.0.0:{}", env.http_port);

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .disable_signals()
        .bind(("0.0.0.0", env.http_port))?
        .run();

    let server_handle = server.handle();

    // Graceful stop on SIGINT/SIGTERM: stop accepting, then drain the pool so
    // every in-flight render finishes before the browsers go away.
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to set up SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to set up SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }

        log::info!("received shutdown signal, stopping server");
        server_handle.stop(true).await;
    });

    let result = server.await;

    pool.shutdown().await;

    result
}
