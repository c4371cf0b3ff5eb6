//! Network layer for the SmartLocker kiosk.
//!
//! Provides the HTTP client for the remote face recognition service. The
//! kiosk only sees verdicts; image capture and the decision to unlock live
//! elsewhere.
//!
//! # Example
//!
//! ```no_run
//! use smartlocker_network::{FaceServiceClient, FaceServiceConfig};
//!
//! # async fn example(jpeg: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let client = FaceServiceClient::new(FaceServiceConfig::new("http://10.0.0.5:8000"))?;
//! let verdict = client.recognize(jpeg).await?;
//! if let Some(identity) = verdict.matched_identity() {
//!     println!("Recognized {identity}");
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod face;

pub use error::{FaceServiceError, FaceServiceResult};
pub use face::{FaceServiceClient, FaceServiceConfig, FaceVerdict};
