pub mod client;
pub mod normalize;
#[cfg(test)]
pub mod test_server;
pub mod types;

pub use client::{fetch_recording, ApiError, CallHistorySource, VendorClient};
pub use types::{CallHistoryPage, SyncWindow, VendorRecord};
