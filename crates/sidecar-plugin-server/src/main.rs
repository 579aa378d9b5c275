//! Worker binary. Spawned alongside the stock firmware to host plugin slots.

use sidecar_core::load_json_or_default;
use sidecar_plugin_server::{Result, Worker, WorkerConfig};
use std::env;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config: WorkerConfig = match env::args().nth(1) {
        Some(path) => load_json_or_default(&PathBuf::from(path))?,
        None => WorkerConfig::default(),
    };
    config.validate()?;

    let mut worker = Worker::from_config(config)?;
    worker.run().await
}
