mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use config::Config;
use db::db::DBClient;
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::filter::LevelFilter;
use uuid::Uuid;

use service::{
    background_jobs,
    escrow_service::EscrowService,
    flow::engine::FlowEngine,
    gateway::PaymentGatewayService,
    ledger_service::LedgerService,
    locks::KeyedLocks,
    notification_service::NotificationService,
    presence::Presence,
    publisher::Publisher,
    push_service::PushService,
    reconciler::Reconciler,
};

pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    pub presence: Presence,
    pub publisher: Publisher,
    pub gateway: Arc<PaymentGatewayService>,
    pub flow_engine: Arc<FlowEngine>,
    pub ledger: Arc<LedgerService>,
    pub escrow: Arc<EscrowService>,
}

impl AppState {
    pub fn new(env: Config, db_client: Arc<DBClient>) -> (Self, Arc<Reconciler>) {
        let presence = Presence::new();
        let publisher = Publisher::new(presence.clone());
        let gateway = Arc::new(PaymentGatewayService::new(&env));
        let notifications = Arc::new(NotificationService::new(db_client.clone(), publisher.clone()));
        let push = Arc::new(PushService::new(db_client.clone(), presence.clone(), &env));

        let conversation_locks = KeyedLocks::<Uuid>::new();
        let wallet_locks = KeyedLocks::<Uuid>::new();

        let flow_engine = Arc::new(FlowEngine::new(
            db_client.clone(),
            gateway.clone(),
            publisher.clone(),
            notifications,
            push,
            conversation_locks,
            env.max_revisions,
            env.transition_timeout_secs,
        ));
        let ledger = Arc::new(LedgerService::new(db_client.clone(), wallet_locks.clone()));
        let escrow = Arc::new(EscrowService::new(
            db_client.clone(),
            wallet_locks,
            env.escrow_quiescence_days,
        ));
        let reconciler = Arc::new(Reconciler::new(
            db_client.clone(),
            gateway.clone(),
            flow_engine.clone(),
            escrow.clone(),
            env.reconcile_after_secs,
        ));

        let state = AppState {
            env,
            db_client,
            presence,
            publisher,
            gateway,
            flow_engine,
            ledger,
            escrow,
        };
        (state, reconciler)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init();

    let pool = match PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connected to the database");
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let db_client = match &config.redis_url {
        Some(redis_url) => match DBClient::with_redis(pool.clone(), redis_url).await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), continuing without it", e);
                DBClient::new(pool)
            }
        },
        None => DBClient::new(pool),
    };

    let (app_state, reconciler) = AppState::new(config.clone(), Arc::new(db_client));

    tokio::spawn(background_jobs::start_payment_reconciler_job(
        reconciler.clone(),
    ));
    tokio::spawn(background_jobs::start_escrow_auto_release_job(reconciler));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app = create_router(Arc::new(app_state)).layer(cors);

    tracing::info!("Server is running on http://localhost:{}", config.port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .unwrap();

    axum::serve(listener, app).await.unwrap();
}
