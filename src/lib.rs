#![cfg_attr(not(feature = "std"), no_std)]
//! Dropout-tolerant secure aggregation.
//!
//! Clients mask private vectors with pairwise and self masks, threshold-share
//! the secrets behind those masks, and let an honest-but-curious server recover
//! the sum of whoever is still live at the end, without ever seeing an
//! individual input.
//!
//! - `config`: participant set, threshold, dimension and round windows.
//! - `core`: GF(256) arithmetic and wrapping vector arithmetic.
//! - `crypto`: X25519 agreement, BLAKE3 mask expansion, sealed share bundles.
//! - `mpc`: Shamir secret sharing over GF(256).
//! - `entropy`: randomness sources.
//! - `protocol`: client and server round engines and their messages.

extern crate alloc;

pub mod config;
pub mod core;
pub mod crypto;
pub mod entropy;
pub mod mpc;
pub mod protocol;

pub use config::AggregationConfig;
pub use protocol::messaging::AggregationOutput;
pub use protocol::session::LocalSession;
pub use protocol::{ClientId, ClientRoundEngine, ProtocolError, ServerCoordinator};
