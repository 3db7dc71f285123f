pub mod debug;
pub mod error;
pub mod query;
pub mod scheduler;
pub mod store;

pub use query::MetricsService;
pub use scheduler::{Gatherer, GathererScheduler};
pub use store::{Series, SeriesStore};

/// A single observation produced by a gather call.
///
/// Samples are consumed immediately by the [`SeriesStore`]; they are never kept on their own.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sample {
    /// The metric type, which selects the series the sample is appended to
    pub type_: String,

    /// The x-axis label of the observation (usually a timestamp)
    pub label: String,

    pub value: i64,
}

impl Sample {
    pub fn new(type_: impl Into<String>, label: impl Into<String>, value: i64) -> Self {
        Sample {
            type_: type_.into(),
            label: label.into(),
            value,
        }
    }
}
