#![allow(dead_code)]

mod db_core;
mod digest;
mod email;
mod error;
mod model;
mod prompt;
mod routes;
mod server_config;
mod state;
mod testing;

use std::{env, net::SocketAddr, time::Duration};

use axum::{extract::FromRef, Router};
use mimalloc::MiMalloc;
use routes::AppRouter;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use state::jobs::JobCoordinator;
use tokio::{signal, task::JoinHandle};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::model::newsletter::NewsletterCtrl;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
pub struct ServerState {
    http_client: HttpClient,
    conn: DatabaseConnection,
    jobs: JobCoordinator,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
        std::fs::create_dir_all("data").expect("Failed to create data directory");
        "sqlite://data/newsletters.db?mode=rwc".to_string()
    });
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .expect("Database connection failed");
    NewsletterCtrl::ensure_schema(&conn)
        .await
        .expect("Failed to create newsletter schema");

    let http_client = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .timeout(Duration::from_secs(120))
        .build()?;

    let state = ServerState {
        http_client,
        conn,
        jobs: JobCoordinator::new(),
    };

    let router = AppRouter::create(state.clone());

    let mut scheduler = JobScheduler::new()
        .await
        .expect("Failed to create scheduler");

    {
        let state_clone = state.clone();
        scheduler
            .add(Job::new_async(
                server_config::cfg.schedule.daily_cron.as_str(),
                move |uuid, mut l| {
                    let state = state_clone.clone();
                    Box::pin(async move {
                        tracing::info!("Running daily ingestion job {}", uuid);
                        if !state::jobs::spawn_daily(state) {
                            tracing::warn!("Daily ingestion job {} skipped", uuid);
                        }

                        let next_tick = l.next_tick_for_job(uuid).await;
                        if let Ok(Some(ts)) = next_tick {
                            tracing::info!("Next daily ingestion run is {:?}", ts)
                        }
                    })
                },
            )?)
            .await?;

        let state_clone = state.clone();
        scheduler
            .add(Job::new_async(
                server_config::cfg.schedule.weekly_cron.as_str(),
                move |uuid, mut l| {
                    let state = state_clone.clone();
                    Box::pin(async move {
                        tracing::info!("Running weekly digest job {}", uuid);
                        if !state::jobs::spawn_weekly(state) {
                            tracing::warn!("Weekly digest job {} skipped", uuid);
                        }

                        let next_tick = l.next_tick_for_job(uuid).await;
                        if let Ok(Some(ts)) = next_tick {
                            tracing::info!("Next weekly digest run is {:?}", ts)
                        }
                    })
                },
            )?)
            .await?;
    }

    scheduler.set_shutdown_handler(Box::new(move || {
        Box::pin(async move {
            tracing::info!("Shutting down scheduler");
        })
    }));

    println!("Starting scheduler...");
    match scheduler.start().await {
        Ok(_) => {
            println!("-------- SCHEDULER STARTED --------");
        }
        Err(e) => {
            println!("Failed to start scheduler: {:?}", e);
        }
    }

    let server_handle = run_server(router, scheduler);
    server_handle.await?;

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
        _ = ctrl_c => {
            scheduler.shutdown().await.unwrap();
            println!("Cleanups done, shutting down");
            std::process::exit(0);

        },
        _ = terminate => {
            scheduler.shutdown().await.unwrap();
            println!("Cleanups done, shutting down");
            std::process::exit(0);
        },
    }
}

fn run_server(router: Router, scheduler: JobScheduler) -> JoinHandle<()> {
    tokio::spawn(async {
        let port = env::var("PORT").unwrap_or("5006".to_string());
        tracing::info!("Newsletter digest server running on http://0.0.0.0:{}", port);
        // check config
        println!("{}", *server_config::cfg);

        let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>().unwrap()));
        tracing::debug!("listening on {addr}");
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(scheduler))
            .await
            .unwrap();
    })
}
