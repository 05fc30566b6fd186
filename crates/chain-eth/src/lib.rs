//! Provider-side primitives for the custom-signature bridge.
//!
//! This crate provides:
//! - EIP-55 checksummed account addresses and their derivation from
//!   compressed secp256k1 public keys
//! - EIP-191 `personal_sign` message hashing and signing
//! - Parsing of RPC signatures and public-key recovery from them

pub mod address;
pub mod error;
pub mod message;
pub mod signature;
