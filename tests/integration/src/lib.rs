//! End-to-end tests for the MAX identity gateway.
//!
//! The tests live in `tests/` and drive a real server over HTTP. Run the
//! Redis backed tests, which need Docker, with `cargo test -- --ignored`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
