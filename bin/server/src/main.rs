#[tokio::main]
async fn main() {
    use flowhook_flow::FanoutPublisher;
    use flowhook_flow::nats::NatsEventBus;
    use flowhook_pipeline::{GITLAB, HandlerPipeline, WebhookValidator};
    use flowhook_provider::{ActionDispatcher, OAuthTokenIssuer, ReqwestProviderHttp};
    use flowhook_server::{
        config::ServerConfig,
        consumer::{self, ConsumerSettings},
        db::PgFlowStore,
        routes::{self, AppState},
    };
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let store = Arc::new(PgFlowStore::new(db_pool));

    // Connect to the event bus
    let stream_name = config.nats.stream_name(&config.bus).to_string();
    let nats_config = config.nats.bus_config();
    let filter_subject = nats_config.all_subjects();
    let bus = Arc::new(
        NatsEventBus::connect(nats_config, stream_name.clone())
            .await
            .expect("failed to connect to NATS"),
    );
    tracing::info!(stream = %stream_name, "Connected to event bus");

    // Provider clients
    let timeout = config.http.timeout();
    let http = Arc::new(ReqwestProviderHttp::new(timeout).expect("failed to build HTTP client"));
    let tokens = Arc::new(OAuthTokenIssuer::new(timeout).expect("failed to build token client"));

    let pipeline = Arc::new(HandlerPipeline::new(
        WebhookValidator::new(store.clone(), GITLAB),
        FanoutPublisher::new(store, bus.clone(), config.bus.clone()).with_retry(config.retry),
        ActionDispatcher::new(http, tokens).with_retry(config.retry),
    ));

    // Spawn the action consumer
    if config.actions.enabled {
        let settings = ConsumerSettings {
            stream_name,
            consumer_name: config.nats.consumer_name.clone(),
            filter_subject,
            consumer_api: config.actions.consumer_api.clone(),
            ack_wait: config.actions.ack_wait(),
        };
        let jetstream = bus.jetstream();
        let consumer_pipeline = pipeline.clone();
        tokio::spawn(async move {
            if let Err(e) = consumer::run(jetstream, settings, consumer_pipeline).await {
                tracing::error!(error = %e, "Action consumer failed");
            }
        });
    }

    let app = routes::router(Arc::new(AppState::new(pipeline)));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
