mod auth;
mod db_core;
mod email;
mod error;
mod model;
mod pipeline;
mod prompt;
mod queue;
mod rate_limiters;
mod request_tracing;
mod routes;
mod server_config;
#[cfg(test)]
mod testing;

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use auth::google_token::TokenRefresher;
use axum::extract::FromRef;
use email::connector::{GmailConnector, MailConnector};
use mimalloc::MiMalloc;
use model::store::{AccountStore, DbAccountStore};
use pipeline::{
    watch::{renew_expiring_watches, WatchTopic},
    Pipeline, PipelineOptions,
};
use prompt::GeminiClient;
use queue::{signature::QueueAuth, JobQueue, QStashClient};
use rate_limiters::RateLimiters;
use routes::AppRouter;
use sea_orm::{ConnectOptions, Database};
use server_config::cfg;
use tokio::signal;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pipeline: Arc<Pipeline>,
    store: Arc<dyn AccountStore>,
    connector: Arc<dyn MailConnector>,
    queue_auth: Option<QueueAuth>,
    watch_topic: WatchTopic,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = match env::var("LOG_FORMAT").as_deref() {
        Ok("json") => tracing_subscriber::fmt::layer().json().boxed(),
        _ => tracing_subscriber::fmt::layer().with_ansi(false).boxed(),
    };

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    tracing::info!("{}", *cfg);

    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);
    let conn = Database::connect(db_options)
        .await
        .expect("Database connection failed");

    let http_client = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(cfg.http.request_timeout_secs))
        .build()?;

    let store: Arc<dyn AccountStore> = Arc::new(DbAccountStore::new(conn));
    let connector: Arc<dyn MailConnector> = Arc::new(GmailConnector::new(
        http_client.clone(),
        cfg.gmail.api_base.clone(),
        TokenRefresher::from_config(http_client.clone()),
        store.clone(),
    ));
    let generator = Arc::new(GeminiClient::from_config(
        http_client.clone(),
        RateLimiters::from_config(),
    ));

    let (queue, queue_auth) = match &cfg.secrets.queue {
        Some(secrets) => {
            let queue: Arc<dyn JobQueue> =
                Arc::new(QStashClient::from_config(http_client.clone(), secrets));
            let auth = QueueAuth {
                destination: cfg.worker_url(),
                current_key: secrets.current_signing_key.clone(),
                next_key: secrets.next_signing_key.clone(),
            };
            (Some(queue), Some(auth))
        }
        None => {
            tracing::warn!("QSTASH_TOKEN not set, jobs run in-process");
            (None, None)
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        connector.clone(),
        generator,
        queue,
        PipelineOptions::from_config(),
    ));

    let state = ServerState {
        pipeline,
        store,
        connector,
        queue_auth,
        watch_topic: WatchTopic(cfg.gmail.topic_name.clone()),
    };

    let mut scheduler = JobScheduler::new().await?;
    {
        let state = state.clone();
        scheduler
            .add(Job::new_async(cfg.watch.renew_cron.as_str(), move |uuid, mut l| {
                let state = state.clone();
                Box::pin(async move {
                    tracing::info!("Running watch renewal job {}", uuid);
                    match renew_expiring_watches(
                        state.store.as_ref(),
                        state.connector.as_ref(),
                        &state.watch_topic,
                        chrono::Duration::hours(cfg.watch.expiring_within_hours),
                    )
                    .await
                    {
                        Ok(renewed) => tracing::info!("Renewed {} watches", renewed),
                        Err(e) => tracing::error!("Watch renewal failed: {:?}", e),
                    }

                    if let Ok(Some(ts)) = l.next_tick_for_job(uuid).await {
                        tracing::info!("Next watch renewal at {:?}", ts);
                    }
                })
            })?)
            .await?;
    }
    scheduler.set_shutdown_handler(Box::new(|| {
        Box::pin(async move {
            tracing::info!("Shutting down scheduler");
        })
    }));
    scheduler.start().await?;

    let router = AppRouter::create(state, Duration::from_secs(cfg.http.request_timeout_secs));
    let port = env::var("PORT").unwrap_or("5006".to_string()).parse::<u16>()?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Flobase server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    Ok(())
}

async fn shutdown_signal(mut scheduler: JobScheduler) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    if let Err(e) = scheduler.shutdown().await {
        tracing::error!("Scheduler shutdown failed: {:?}", e);
    }
    tracing::info!("Cleanups done, shutting down");
}
