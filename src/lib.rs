//! Argus - a license verification and entitlement server
//!
//! Argus answers client "am I allowed to run?" requests with signed,
//! rate-limited verdicts. A verification takes a license key, optional
//! customer/product/version/device identifiers and a challenge nonce, and
//! runs a fixed pipeline of policy checks: blacklists, entitlement
//! matching, expiration, and usage limits. Valid verdicts can carry an
//! Ed25519 signature over the caller's challenge, proving they came from
//! the holder of the team's private key.
//!
//! # Modules
//!
//! - [`engine`] - the policy pipeline and outcome taxonomy
//! - [`crypto`] - lookup key derivation, challenge signing, at-rest keys
//! - [`geo`] - the geolocation collaborator
//! - [`model`] - domain types mirroring the store schema
//! - [`server`] - axum handlers, router, database and middleware
//! - [`config`] - layered configuration (`config.toml` + `ARGUS_*` env)

pub mod config;
pub mod crypto;
pub mod engine;
pub mod errors;
pub mod geo;
pub mod model;
pub mod server;
