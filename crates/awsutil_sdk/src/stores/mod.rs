//! Resource-style wrappers over the service clients.
//!
//! These are the higher-level counterparts to the raw clients: each owns its
//! own client and exposes multi-call operations (create-and-wait, batched
//! writes, paginated scans) for one service family.

pub mod kv;
pub mod object;
pub mod vm;
