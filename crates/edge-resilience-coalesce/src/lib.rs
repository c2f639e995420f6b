//! Duplicate suppression for the edge pipeline.
//!
//! This crate provides a Tower layer that coalesces concurrent identical
//! HTTP requests, ensuring only one executes while the others wait for its
//! result. This prevents "cache stampede" or "thundering herd" problems when
//! many clients ask for the same expensive resource at once.
//!
//! # How It Works
//!
//! 1. Each `GET`/`HEAD` request gets a [`RequestSignature`] (method, path,
//!    query and gzip capability); other methods always execute
//! 2. The first request with a given signature becomes the leader and runs
//! 3. Requests arriving while it runs wait on a broadcast channel instead of
//!    calling the handler
//! 4. The leader buffers the full response and every waiter receives its own
//!    copy with identical status, headers and bytes
//! 5. Errors are replayed to all waiters as [`Coalesced`]; if the leader is
//!    dropped mid-flight they get [`LeaderCancelled`]
//!
//! # Example
//!
//! ```rust
//! use edge_resilience_coalesce::CoalesceLayer;
//! use http::{Request, Response};
//! use tower::{Service, ServiceBuilder, ServiceExt};
//!
//! # async fn example() -> Result<(), edge_resilience_core::BoxError> {
//! let mut service = ServiceBuilder::new()
//!     .layer(CoalesceLayer::new())
//!     .service(tower::service_fn(|_req: Request<()>| async {
//!         Ok::<_, std::io::Error>(Response::new(String::from("inventory")))
//!     }));
//!
//! let request = Request::get("/inventory").body(())?;
//! let response = service.ready().await?.call(request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Prior Art
//!
//! This pattern is also known as:
//! - **Singleflight** (Go's `golang.org/x/sync/singleflight`)
//! - **Request deduplication**
//! - **Request collapsing**

mod config;
mod layer;
mod service;
mod signature;

pub use config::{CoalesceConfig, CoalesceConfigBuilder, SignatureFn};
pub use edge_resilience_core::{Coalesced, LeaderCancelled};
pub use layer::{CoalesceLayer, CoalesceLayerBuilder};
pub use service::{CapturedResponse, CoalesceService};
pub use signature::RequestSignature;
