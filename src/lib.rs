// src/lib.rs

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use config::AppConfig;
use services::{
    acquisition::AcquisitionCoordinator, alert_engine::AlertEngine,
    market_analysis::MarketAnalyzer, notifier::NotificationDispatcher,
    price_store::{MemoryPriceStore, PriceStore},
};

#[derive(Clone)]
pub struct AppState {
    /// Long-term daily aggregate; `None` when DATABASE_URL is unset
    pub db: Option<DatabaseConnection>,
    pub store: Arc<dyn PriceStore>,
    pub coordinator: AcquisitionCoordinator,
    pub analyzer: MarketAnalyzer,
    pub alert_engine: Arc<AlertEngine>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the analyzer and alert engine around an existing store, coordinator and dispatcher
    pub fn assemble(
        config: AppConfig,
        db: Option<DatabaseConnection>,
        store: Arc<dyn PriceStore>,
        coordinator: AcquisitionCoordinator,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        let analyzer = MarketAnalyzer::new(store.clone(), &config);
        let alert_engine = Arc::new(AlertEngine::new(
            config.alerts.clone(),
            config.store.clone(),
            analyzer.clone(),
            dispatcher.clone(),
        ));

        Self {
            db,
            store,
            coordinator,
            analyzer,
            alert_engine,
            dispatcher,
            config: Arc::new(config),
        }
    }

    /// Production wiring: in-memory store, configured upstreams and channels
    pub fn from_config(config: AppConfig, db: Option<DatabaseConnection>) -> Self {
        let store: Arc<dyn PriceStore> = Arc::new(MemoryPriceStore::new(&config.store));
        let coordinator = AcquisitionCoordinator::from_config(&config, store.clone());
        let dispatcher = Arc::new(NotificationDispatcher::from_config(&config.channels));
        Self::assemble(config, db, store, coordinator, dispatcher)
    }
}

pub mod config;
pub mod error;

pub mod entities {
    pub mod gold_daily_closes;
}

pub mod services {
    pub mod indicators;
    pub mod trend;
    pub mod signal_scorer;
    pub mod price_source;
    pub mod price_store;
    pub mod acquisition;
    pub mod market_analysis;
    pub mod notifier;
    pub mod alert_engine;
    pub mod daily_closes;
}

pub mod models;
pub mod handlers;
pub mod jobs;
