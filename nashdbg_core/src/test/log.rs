//! Loggings for testing.
//!
//! NOTE: This module should only be used in unit tests, not some where else.

use crate::consts::NASHDBG_LOG;
use std::sync::Once;

/// Initialize logging prints to `stderr`, honoring the `NASHDBG_LOG`
/// environment variable.
pub fn init() {
  static INITIALIZED: Once = Once::new();
  INITIALIZED.call_once(|| {
    let filter = tracing_subscriber::EnvFilter::try_from_env(NASHDBG_LOG)
      .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init();
  });
}
