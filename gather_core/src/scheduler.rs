use anyhow::Result;
use async_std::task::JoinHandle;
use async_trait::async_trait;
use futures::channel::oneshot;
use futures::future::{self, FutureExt};
use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::debug::DEBUG;
use crate::error::{debug_error, GatherError};
use crate::store::SeriesStore;
use crate::Sample;

/// A Gatherer knows how to collect the samples for one service.
///
/// A gather call must not block indefinitely: the next generation of every job
/// waits for the slowest gatherer of the previous one.
#[async_trait]
pub trait Gatherer: Send + Sync {
    async fn gather(&self) -> Result<Vec<Sample>>;
}

#[async_trait]
impl<F, Fut> Gatherer for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Sample>>> + Send + 'static,
{
    async fn gather(&self) -> Result<Vec<Sample>> {
        (self)().await
    }
}

/// Runs every registered gatherer once per tick and feeds the results into a [`SeriesStore`].
///
/// Registration takes `&mut self` and [`run`](Self::run) consumes the scheduler, so
/// every job is registered before the first generation starts.
pub struct GathererScheduler {
    jobs: HashMap<String, Arc<dyn Gatherer>>,
    store: Arc<SeriesStore>,

    /// The number of generations started so far
    generation: u64,

    /// Workers of the most recent generation that haven't been waited on yet
    in_flight: Vec<JoinHandle<()>>,
}

impl GathererScheduler {
    pub fn new(store: Arc<SeriesStore>) -> Self {
        GathererScheduler {
            jobs: HashMap::new(),
            store,
            generation: 0,
            in_flight: Vec::new(),
        }
    }

    /// Register the gatherer for a service, replacing any previous one
    pub fn add<G>(&mut self, service: impl Into<String>, gatherer: G)
    where
        G: Gatherer + 'static,
    {
        let service = service.into();
        if self.jobs.insert(service.clone(), Arc::new(gatherer)).is_some() {
            log::debug!("replaced gatherer for service {}", service);
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn services(&self) -> Vec<String> {
        let mut services = self.jobs.keys().cloned().collect::<Vec<_>>();
        services.sort();
        services
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a generation on every tick until `shutdown` fires.
    ///
    /// The clock source is dropped when the loop exits. Workers of the last generation are
    /// not waited on, so their samples may still reach the store after this returns.
    pub async fn run<T>(mut self, ticks: T, shutdown: oneshot::Receiver<()>)
    where
        T: Stream + Unpin,
    {
        log::info!("starting metrics gatherers for {} services", self.jobs.len());
        let mut ticks = ticks.fuse();
        // `Receiver` reports itself terminated once its sender is dropped, which would make
        // `select!` skip it; `Fuse` keeps polling it until it resolves to `Err(Canceled)`
        let mut shutdown = shutdown.fuse();
        loop {
            futures::select! {
                tick = ticks.next() => match tick {
                    Some(_) => self.execute().await,
                    None => {
                        log::info!("clock stopped; no more generations will run");
                        break;
                    }
                },
                // A dropped sender is treated the same as a shutdown signal
                _ = shutdown => break,
            }
        }

        log::info!("stopping metrics gatherers");
        drop(ticks);
        log::info!("gatherers stopped after {} generations", self.generation);
    }

    async fn execute(&mut self) {
        // Wait for the previous generation to be done before starting the next
        log::debug!("waiting for generation {} to finish", self.generation);
        self.barrier().await;

        self.generation += 1;
        DEBUG.generation_started();
        log::debug!(
            "executing {} gatherers for generation {}",
            self.jobs.len(),
            self.generation
        );
        for (service, gatherer) in &self.jobs {
            let task = async_std::task::spawn(gather_service(
                Arc::clone(&self.store),
                service.clone(),
                Arc::clone(gatherer),
                self.generation,
            ));
            self.in_flight.push(task);
        }
    }

    async fn barrier(&mut self) {
        future::join_all(self.in_flight.drain(..)).await;
    }
}

/// Tracks a running gather task in the debug metrics until dropped.
struct GatherTask;

impl GatherTask {
    fn start() -> Self {
        DEBUG.gather_task_started();
        GatherTask
    }
}

impl Drop for GatherTask {
    fn drop(&mut self) {
        DEBUG.gather_task_finished();
    }
}

async fn gather_service(
    store: Arc<SeriesStore>,
    service: String,
    gatherer: Arc<dyn Gatherer>,
    generation: u64,
) {
    let _task = GatherTask::start();

    // A panicking gatherer only loses its own samples for this generation
    let result = AssertUnwindSafe(gatherer.gather())
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            Err(GatherError::Panicked {
                service: service.clone(),
            }
            .into())
        });
    match result {
        Ok(samples) => {
            DEBUG.gather_succeeded();
            DEBUG.samples_stored(samples.len());
            log::debug!(
                "gathered {} samples for service {}",
                samples.len(),
                service
            );
            for sample in samples {
                store.add(&service, sample);
            }
        }
        Err(err) => {
            DEBUG.gather_failed();
            debug_error(err.context(format!(
                "failed to gather metrics for service {} (generation {})",
                service, generation
            )));
        }
    }
}
