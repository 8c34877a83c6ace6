// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleetd: the device-automation backend's flow execution engine, wired to
//! concrete transport/broker adapters and served over HTTP.

pub mod broker_impl;
pub mod config;
pub mod http;
pub mod transport_impl;

use std::sync::{Arc, OnceLock};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use fleetcore::command_queue::CommandQueue;
use fleetcore::executor::{FlowExecutor, TransportProvider};
use fleetcore::identity::migrator::DeviceDataMigrator;
use fleetcore::identity::IdentityResolver;
use fleetcore::monitor::connection::{CommandExecutor, ConnectionMonitor, DeviceProbe};
use fleetcore::monitor::performance::PerformanceMonitor;
use fleetcore::navigation::NavigationManager;
use fleetcore::scheduler::{FlowRunner, FlowScheduler};
use fleetcore::store::{ActionStore, FlowStore, SensorStore};
use fleetcore::transport::{BoxFuture, BrokerPublisher};

use crate::broker_impl::LoggingBroker;
use crate::config::AppConfig;
use crate::transport_impl::TransportRegistry;

/// Forwards [`FlowRunner::run`] to whatever executor is installed after
/// construction. Exists to break the wiring cycle between the scheduler
/// (which needs a runner up front) and the flow executor (which needs a
/// fully built performance monitor, which in turn needs the scheduler).
struct DeferredRunner {
    inner: OnceLock<Arc<dyn FlowRunner>>,
}

impl DeferredRunner {
    fn new() -> Self {
        Self { inner: OnceLock::new() }
    }

    fn install(&self, runner: Arc<dyn FlowRunner>) {
        if self.inner.set(runner).is_err() {
            tracing::error!("flow runner installed twice");
        }
    }
}

impl FlowRunner for DeferredRunner {
    fn run(&self, stable_id: String, flow_id: String) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self.inner.get() {
                Some(runner) => runner.run(stable_id, flow_id).await,
                None => tracing::error!(stable_id, flow_id, "flow run requested before executor was installed"),
            }
        })
    }
}

/// Run the fleetd daemon until shutdown.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let engine_config = config.engine_config();

    std::fs::create_dir_all(&engine_config.data_dir)?;
    std::fs::create_dir_all(&engine_config.flows_dir)?;
    std::fs::create_dir_all(&engine_config.navigation_dir)?;
    std::fs::create_dir_all(&engine_config.flow_history_dir)?;

    let sensor_store = Arc::new(SensorStore::new(engine_config.data_dir.clone()));
    let action_store = Arc::new(ActionStore::new(engine_config.data_dir.clone()));
    let flow_store = Arc::new(FlowStore::new(engine_config.flows_dir.clone(), engine_config.flow_history_dir.clone()));
    let identity = Arc::new(IdentityResolver::new(engine_config.data_dir.join("device_identity_map.json")));
    let migrator = Arc::new(DeviceDataMigrator::new(engine_config.data_dir.clone(), engine_config.flows_dir.clone()));
    let navigation = Arc::new(NavigationManager::new(engine_config.navigation_dir.clone()));
    let command_queue = Arc::new(CommandQueue::new(engine_config.data_dir.clone(), &engine_config));
    let transports = Arc::new(TransportRegistry::new(&config, Arc::clone(&identity), Arc::clone(&migrator)));
    let broker: Arc<dyn BrokerPublisher> = Arc::new(LoggingBroker::new(config.broker_host.clone()));

    let runner_slot = Arc::new(DeferredRunner::new());
    let scheduler = FlowScheduler::new(
        engine_config.clone(),
        Arc::clone(&runner_slot) as Arc<dyn FlowRunner>,
        shutdown.clone(),
    );

    let performance = Arc::new(PerformanceMonitor::new(engine_config.clone(), scheduler.clone(), Arc::clone(&broker)));

    let executor = Arc::new(FlowExecutor::new(
        engine_config.clone(),
        Arc::clone(&transports) as Arc<dyn TransportProvider>,
        Arc::clone(&broker),
        Arc::clone(&sensor_store),
        Arc::clone(&action_store),
        Arc::clone(&flow_store),
        Arc::clone(&performance),
        Arc::clone(&command_queue),
    ));
    runner_slot.install(Arc::clone(&executor) as Arc<dyn FlowRunner>);

    let connection_monitor = Arc::new(ConnectionMonitor::new(
        engine_config.clone(),
        Arc::clone(&transports) as Arc<dyn DeviceProbe>,
        Arc::clone(&broker),
        Arc::clone(&command_queue),
        Arc::clone(&executor) as Arc<dyn CommandExecutor>,
        scheduler.clone(),
        shutdown.clone(),
    ));

    let state = http::AppState {
        sensor_store,
        action_store,
        flow_store,
        scheduler,
        connection_monitor,
        performance,
        identity,
        navigation,
    };

    let router = http::build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("fleetd listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
