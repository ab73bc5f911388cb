//! Lazy service-handle registry primitives.
//!
//! This crate owns the per-owner caching contract for cloud service handles:
//! the closed set of handle kinds, the key-value backend selection type, the
//! factory seam, and the slot cache itself. It intentionally excludes AWS SDK
//! concerns; see `awsutil_sdk` for the SDK-backed factory and session types.

pub mod backend;
pub mod error;
pub mod factory;
pub mod kind;
pub mod registry;
