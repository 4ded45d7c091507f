//! Arithmetic primitives.
//!
//! - `gf256`: the byte field Shamir sharing runs over.
//! - `vector`: element-wise arithmetic over Z/2^64, the group masked inputs live in.

pub mod gf256;
pub mod vector;
