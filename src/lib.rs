//! Library half of the `shardnet` binary crate: CLI-facing configuration.
//! The actual node/protocol implementation lives in `shardnet-core`; this
//! crate only adds the bits that are inherently CLI concerns (config file
//! loading, default paths) so `main.rs` stays thin.

pub mod config;
