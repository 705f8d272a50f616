//! # max-cache-redis
//!
//! Redis implementation of the [`max_cache::Cache`] trait using `fred`.
//!
//! ## Features
//!
//! - Automatic reconnection with exponential backoff
//! - TLS (`rediss://`)
//! - Namespaced keys
//! - Optional debugger reporting keys that expire without ever being read
//!
//! ## Example
//!
//! ```ignore
//! use max_cache::Cache;
//! use max_cache_redis::{RedisCache, RedisConfig};
//!
//! let cache = RedisCache::new(RedisConfig::default().host("localhost")).await?;
//! cache.set("key", "value").await?;
//! ```

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod config;
pub mod debugger;
pub mod error;
pub mod provider;

pub use config::RedisConfig;
pub use debugger::RedisGetDebugger;
pub use provider::RedisCache;
