//! Sync layer: REST access to the hosted database behind the CRM dashboard.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{RestClient, SyncError};
