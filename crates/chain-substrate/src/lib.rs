//! Ledger-side primitives for the custom-signature bridge.
//!
//! - SS58 network prefixes and SS58 address encoding/decoding
//! - ECDSA account ids: blake2b-256 of the compressed secp256k1 key

pub mod account;
pub mod error;
pub mod ss58;
