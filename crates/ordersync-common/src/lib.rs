//! ordersync common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared order model, error types and logging setup for the ordersync workspace.
//!
//! - **Types**: upstream [`RawOrder`] records and the persisted [`CanonicalOrder`] document
//! - **Errors**: [`RecordError`] for records that cannot be normalized
//! - **Logging**: [`logging::init_logging`] wiring `tracing-subscriber`
//!
//! # Example
//!
//! ```no_run
//! use ordersync_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

pub use error::{RecordError, Result};
pub use types::{CanonicalOrder, Cancellation, ProductEntry, RawOrder};
