use std::sync::Arc;

use crate::store::{Series, SeriesStore};

/// Read-only access to the series gathered for each service.
///
/// Missing data is reported as `None`; gather failures are never surfaced here.
#[derive(Clone)]
pub struct MetricsService {
    store: Arc<SeriesStore>,
}

impl MetricsService {
    pub fn new(store: Arc<SeriesStore>) -> Self {
        MetricsService { store }
    }

    /// Get every series gathered for a service
    pub fn get_all(&self, service: &str) -> Option<Vec<Series>> {
        self.store.read(service)
    }

    /// Get the series of a single metric type for a service
    pub fn get_one(&self, service: &str, type_: &str) -> Option<Series> {
        self.store
            .read(service)?
            .into_iter()
            .find(|series| series.type_() == type_)
    }

    pub fn services(&self) -> Vec<String> {
        self.store.services()
    }
}
