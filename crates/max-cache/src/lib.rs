//! # max-cache
//!
//! Cache abstraction for the MAX identity gateway.
//!
//! All short lived state (login state, authorization codes, access tokens,
//! rate limiter counters) lives behind the [`Cache`] trait. Production uses
//! Redis (see `max-cache-redis`); tests and local development use
//! [`MemoryCache`].
//!
//! ## Example
//!
//! ```ignore
//! use max_cache::{Cache, CacheExt, CacheResult};
//!
//! async fn remember(cache: &dyn Cache, code: &str, ctx: &AcsContext) -> CacheResult<()> {
//!     cache.set_complex_object(code, ctx).await
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod provider;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;
pub use provider::{Cache, CacheExt};
