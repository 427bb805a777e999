//! Infrastructure layer: retries, the expiry store, config, external services.

pub mod config;
pub mod expiry;
pub mod external;
pub mod retry;

#[cfg(test)]
mod integration_tests;
