//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured, timestamped log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → operator terminal (stderr)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (peer, conn, class, bytes) on every connection event
//! - Metrics are cheap (atomic increments) and recorded even when no exporter
//!   is installed
//! - Chat text itself goes to the display sink, never to the log

pub mod logging;
pub mod metrics;
