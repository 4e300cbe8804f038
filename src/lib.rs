//! Thin binary crate: wires [`config`], [`observer`], and [`server`]
//! together behind a single `run` entry point.

pub mod config;
pub mod observer;
pub mod server;

use std::sync::Arc;

use config::Config;
use observer::{EngineHandler, LoggingHandler};

/// Load configuration, then run the demo port layer until it errors out.
pub async fn run(config: Arc<Config>) -> anyhow::Result<()> {
    let handler: Arc<dyn EngineHandler> = Arc::new(LoggingHandler);
    server::run(config, handler).await
}
