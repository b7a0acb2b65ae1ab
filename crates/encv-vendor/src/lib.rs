//! Client for the ENCV admin API realm statistics endpoint.

pub mod client;
pub mod error;
pub(crate) mod retry;
pub mod types;

pub use client::EncvClient;
pub use error::VendorError;
pub use types::RealmStatsResponse;
