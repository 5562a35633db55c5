//! dredge-core: history-reduction and resumable-pagination engine.
//!
//! The engine pages through a CRM's deal-search endpoint, fetches each deal's
//! property version history, reduces that history under a configurable
//! reduction policy, and writes one CSV batch per page. The remote API and
//! the batch sink are both seams ([`client::CrmApi`], [`sink::BatchSink`]) so
//! every piece of the pipeline runs against scripted fakes in tests.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums at the seams; callers use `?`.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod cancel;
pub mod client;
pub mod directory;
pub mod extract;
pub mod history;
pub mod model;
pub mod reduce;
pub mod sink;
