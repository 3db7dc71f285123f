//! Gather Bot

mod config;
mod scrape;

use anyhow::{Context, Result}; // alias std::result::Result with dynamic error type
use futures::channel::oneshot;
use futures::stream::StreamExt;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

use gather_core::debug::DEBUG;
use gather_core::error::debug_error_enabled;
use gather_core::{GathererScheduler, MetricsService, SeriesStore};

use crate::config::Config;
use crate::scrape::ScrapeTarget;

/// The program's main entry point.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::load()?;

    let (send_shutdown, recv_shutdown) = oneshot::channel::<()>();

    // When we receive a SIGINT (or SIGTERM) signal, begin exiting.
    let signal_once = Cell::new(Some(send_shutdown));
    ctrlc::set_handler(move || {
        // The first time we receive the signal, shutdown gracefully
        if let Some(sender) = signal_once.take() {
            sender.send(()).ok();
        }
        // The second time we receive the signal, shutdown immediately
        else {
            std::process::exit(1);
        }
    })?;

    // Start the main event loop
    async_std::task::block_on(run(config, recv_shutdown))
}

/// The main thread's event loop
async fn run(config: Config, shutdown: oneshot::Receiver<()>) -> Result<()> {
    debug_error_enabled(config.debug);

    // The scheduler writes to the store, the metrics service reads from it
    let store = Arc::new(SeriesStore::new());
    let metrics = MetricsService::new(Arc::clone(&store));
    let mut scheduler = GathererScheduler::new(store);
    for (service, url) in &config.targets {
        log::info!("Target: {} ({})", service, url);
        let target = ScrapeTarget::new(service.clone(), url.clone(), config.gather_timeout);
        scheduler.add(service.clone(), target);
    }
    if scheduler.is_empty() {
        log::warn!("No gather targets configured; nothing will be collected");
    }

    // Every debug interval, log debug information
    let debug_interval = match config.debug_interval {
        Some(duration) => Some(async_std::task::spawn(async move {
            let mut interval = async_std::stream::interval(duration);
            while let Some(_) = interval.next().await {
                DEBUG.publish();
            }
        })),
        None => None,
    };

    // Every GATHER_INTERVAL, run every gatherer; returns once we are asked to shutdown
    let ticks = Box::pin(async_std::stream::interval(config.gather_interval));
    scheduler.run(ticks, shutdown).await;

    if let Some(debug_interval) = debug_interval {
        debug_interval.cancel().await;
    }

    if config.dump {
        let gathered = metrics
            .services()
            .into_iter()
            .filter_map(|service| {
                let series = metrics.get_all(&service)?;
                Some((service, series))
            })
            .collect::<BTreeMap<_, _>>();
        let json = serde_json::to_string_pretty(&gathered).context("serializing metrics")?;
        println!("{}", json);
    }

    Ok(())
}
