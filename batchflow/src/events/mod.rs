//! Pipeline event reporting.
//!
//! Every stage transition of a run is reported to the run's [`EventSink`].
//! Events are named `<subject>.<verb>` (`stage.started`, `load.completed`)
//! and carry a JSON payload enriched with the run identity.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
