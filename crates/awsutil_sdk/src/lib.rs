//! AWS SDK bindings for the lazy service-handle registry.
//!
//! This crate owns client construction over the AWS SDK for Rust: the
//! [`factory::SdkHandleFactory`] that builds one client per handle kind, the
//! [`session::AwsSession`] facade callers hold, the resource-style store
//! wrappers, and the Lambda function deployer. The caching contract itself
//! lives in `awsutil_core`.

pub mod deploy;
pub mod error;
pub mod factory;
pub mod session;
pub mod stores;
