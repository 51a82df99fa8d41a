//! Rt Client Library
//!
//! Provides a typed HTTP client for the Rt estimation gateway.
//!
//! # Example
//!
//! ```rust,no_run
//! use rt_client::{IncidenceRequest, RtClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RtClient::new("http://localhost:5000")?;
//!
//!     let request = IncidenceRequest::from_counts(
//!         [1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233],
//!         (0..12).map(|i| format!("2020-03-{:02}", i + 1)),
//!     );
//!     let estimate = client.estimate(&request).await?;
//!     println!("R(t) = {:?}", estimate.v);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module runs a router on an ephemeral port:
//!
//! ```rust,ignore
//! use rt_client::testing::TestServer;
//! use rt_api::{create_router, AppState};
//!
//! let server = TestServer::start(create_router(state)).await?;
//! let estimate = server.client.estimate(&request).await?;
//! ```

mod client;
mod error;
pub mod testing;

pub use client::RtClient;
pub use error::{Result, RtClientError};

// Re-export core types for convenience
pub use rt_core::{EstimationResult, IncidenceRequest};
