//! Core infrastructure for edge-resilience.
//!
//! This crate provides the pieces every stage of the edge pipeline shares:
//! - [`body`]: the boxed response body type and constructors
//! - [`error`]: the rejection taxonomy and its HTTP mapping
//! - [`events`]: listener plumbing for observability hooks
//! - [`identity`]: client identity derivation for admission control
//! - [`negotiate`]: `Accept-Encoding` handling shared by compression and coalescing

pub mod body;
pub mod error;
pub mod events;
pub mod identity;
pub mod negotiate;

pub use body::BoxBody;
pub use error::{BoxError, CircuitOpen, Coalesced, EdgeError, LeaderCancelled, RateLimited};
pub use events::{EdgeEvent, EventListener, EventListeners, FnListener};
pub use identity::{client_identity, identity_from_parts, PeerAddr};
pub use negotiate::accepts_gzip;
