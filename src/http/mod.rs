//! Registry HTTP access with retry logic and error handling.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::NonRetryableError;
