//! Broker collaborators for tickbar.
//!
//! A broker accepts [`OrderRequest`](tickbar_core::OrderRequest)s, reports
//! fills asynchronously on an [`OrderEvent`] channel and exposes the current
//! position per feed.
//!
//! - [`PaperBroker`]: immediate fills at the reference price
//! - [`ObservationBroker`]: accepts and records, never fills
//! - [`MockBroker`]: scripted outcomes for tests

pub mod broker;
pub mod error;
pub mod mock;
pub mod observation;
pub mod paper;

pub use broker::{BoxFuture, Broker, DynBroker, OrderEvent, OrderStatus};
pub use error::{BrokerError, BrokerResult};
pub use mock::{MockBroker, MockOutcome};
pub use observation::ObservationBroker;
pub use paper::{PaperBroker, PaperBrokerConfig};
