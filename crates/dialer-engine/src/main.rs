//! Dialer Manager
//!
//! Coordinates predictive, progressive, and preview outbound dialing
//! campaigns over a shared Call Service, Switch Driver, and Event Publisher.

use std::sync::Arc;

use async_trait::async_trait;
use call_service::CallService;
use dialer_core::{DependencyStatus, DialerError, DialerService, HealthStatus, MicroserviceRuntime, ReadinessStatus};
use dialer_store::{DurablePool, FastStore};
use switch_driver::EslSwitchDriver;
use tracing::info;

mod config;
mod error;
mod event_bus;
mod http;
mod manager;
mod predictive;
mod preview;
mod progressive;
mod waiting;
mod watchdog;

use config::EngineConfig;
use event_bus::EventPublisher;
use manager::DialerManager;

#[tokio::main]
async fn main() -> dialer_core::Result<()> {
    let _telemetry = dialer_telemetry::init("dialer-engine")
        .map_err(|e| DialerError::Config(e.to_string()))?;

    info!("starting dialer manager");

    let config = EngineConfig::from_env().map_err(|e| DialerError::Config(e.to_string()))?;
    let service = Arc::new(DialerEngineService::new(config).await?);
    MicroserviceRuntime::run(service).await
}

struct DialerEngineService {
    http_bind: String,
    manager: Arc<DialerManager>,
    call_service: Arc<CallService>,
    durable: Arc<DurablePool>,
    watchdog: tokio::task::JoinHandle<()>,
    start_time: std::time::Instant,
}

impl DialerEngineService {
    async fn new(config: EngineConfig) -> dialer_core::Result<Self> {
        let fast = FastStore::connect(config.fast_store)
            .await
            .map_err(|e| DialerError::Database(e.to_string()))?;
        let durable = Arc::new(
            DurablePool::new(config.pool)
                .await
                .map_err(|e| DialerError::Database(e.to_string()))?,
        );
        let call_service = Arc::new(CallService::new(fast, durable.clone()));

        let switch: Arc<dyn switch_driver::SwitchDriver> = Arc::new(EslSwitchDriver::connect(config.switch));

        let events = Arc::new(
            EventPublisher::new(config.event_bus).map_err(|e| DialerError::Network(e.to_string()))?,
        );

        let manager = DialerManager::new(switch, call_service.clone(), durable.clone(), events.clone());

        let watchdog = watchdog::Watchdog::spawn(
            config.watchdog,
            call_service.clone(),
            durable.clone(),
            events,
        );

        Ok(Self {
            http_bind: config.http_bind,
            manager,
            call_service,
            durable,
            watchdog,
            start_time: std::time::Instant::now(),
        })
    }
}

#[async_trait]
impl DialerService for DialerEngineService {
    fn service_id(&self) -> &'static str {
        "dialer-engine"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: self.service_id().to_string(),
            version: self.version().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    async fn ready(&self) -> ReadinessStatus {
        let db_ok = self.durable.is_healthy().await;
        ReadinessStatus {
            ready: db_ok,
            dependencies: vec![DependencyStatus {
                name: "durable-store".to_string(),
                available: db_ok,
                latency_ms: None,
            }],
        }
    }

    /// Stops every running campaign. The switch socket and publisher are
    /// dropped with the process; neither exposes an explicit close (§4.6).
    async fn shutdown(&self) -> dialer_core::Result<()> {
        info!("shutting down dialer manager");
        self.manager.shutdown().await;
        self.watchdog.abort();
        Ok(())
    }

    async fn start(&self) -> dialer_core::Result<()> {
        let state = http::AppState {
            manager: self.manager.clone(),
            call_service: self.call_service.clone(),
        };
        let app = http::create_router(state);

        info!(bind = %self.http_bind, "dialer manager HTTP surface listening");
        let listener = tokio::net::TcpListener::bind(&self.http_bind)
            .await
            .map_err(DialerError::from)?;
        axum::serve(listener, app).await.map_err(|e| DialerError::Network(e.to_string()))?;
        Ok(())
    }
}
