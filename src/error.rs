//! Typed errors for the aggregation step.

/// Raised when a trip cannot be assigned to a day.
///
/// Aggregation stops at the first such record; partial daily totals are
/// never emitted.
#[derive(thiserror::Error, Debug)]
pub enum AggregateError {
    #[error("pickup timestamp {value:?} does not match %Y-%m-%d %H:%M:%S")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}
