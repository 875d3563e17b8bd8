//! RawEvent sources for tickbar.
//!
//! Each source runs as its own task and pushes [`SourceEvent`]s into a
//! bounded per-feed channel:
//! - `WsSource`: live JSON-over-WebSocket stream with reconnect/backoff
//! - `CsvSource`: historical rows from a generic CSV file
//! - `MemorySource`: scripted events, for tests and dry runs

pub mod error;
pub mod event;
pub mod historical;
pub mod memory;
pub mod ws;

pub use error::{SourceError, SourceResult};
pub use event::{spawn_source, BoxFuture, EventSource, SourceEvent, SourceHandle};
pub use historical::{CsvColumns, CsvSource};
pub use memory::MemorySource;
pub use ws::{ConnectionState, StreamKind, WsSource, WsSourceConfig};
