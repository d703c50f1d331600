use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use chorus_api::agents::{Agent, CalendarAgent, PlannerAgent, WeatherAgent};
use chorus_api::api::{self, AppState};
use chorus_api::bus::CommandBus;
use chorus_api::config::AppConfig;
use chorus_api::orchestration::Workflow;
use chorus_api::streaming::{BatchingDispatcher, LogSink, SpeechDispatcher};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration (reads .env)
    let config = AppConfig::from_env().expect("Invalid configuration");

    // Start the event bus
    let bus = CommandBus::start(config.bus);

    // Register agents
    let weather: Arc<dyn Agent> = Arc::new(WeatherAgent::new(bus.clone()));
    let calendar: Arc<dyn Agent> = Arc::new(CalendarAgent::new(bus.clone()));
    let planner: Arc<dyn Agent> = Arc::new(PlannerAgent::new(
        bus.clone(),
        vec![Arc::clone(&weather), Arc::clone(&calendar)],
    ));
    let workflow = Workflow::new(bus.clone(), config.workflow.clone()).with_agents([planner, weather, calendar]);
    tracing::info!(
        agents = ?workflow.list_agents(),
        topology = %config.workflow.topology,
        "Workflow ready"
    );

    // Speech dispatcher
    let speech = bus.subscribe();
    let dispatcher: JoinHandle<()> = match config.batch_window {
        Some(window) => {
            let batching = BatchingDispatcher::new(LogSink::new(), config.dispatcher.clone(), window);
            tokio::spawn(async move {
                batching.run(speech).await;
            })
        }
        None => {
            let direct = SpeechDispatcher::new(LogSink::new(), config.dispatcher.clone());
            tokio::spawn(async move {
                direct.run(speech).await;
            })
        }
    };

    // Build router
    let app = api::router(AppState::new(bus.clone(), workflow));

    // Start server
    tracing::info!("Server listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(bus.clone()))
        .await
        .expect("Server failed");

    // The dispatcher flushes once its subscription ends
    if let Err(e) = dispatcher.await {
        tracing::error!(error = %e, "Speech dispatcher task failed");
    }
}

/// Resolves on Ctrl-C after stopping the bus, which ends every open
/// event stream so in-flight connections can finish.
async fn shutdown_signal(bus: CommandBus) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutting down");
    bus.shutdown();
}
