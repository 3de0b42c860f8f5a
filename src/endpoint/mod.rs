//! # Endpoint Components
//!
//! ## Endpoint ([`endpoint`])
//! Owns the outbound and inbound queues and the tasks that serve them:
//! an accept loop with one handler per inbound connection, and a single
//! sender loop that delivers outbound packages in order.
//!
//! ## Packages ([`package`])
//! [`SendPackage`] and [`RecvPackage`], the entries of the two queues.
//!
//! ## Connection ([`connection`])
//! One-frame-per-connection TCP reads and writes.

pub mod connection;
pub mod endpoint;
pub mod package;

// Re-export for convenience
pub use endpoint::{CloseMode, Endpoint, EndpointError, EndpointState};
pub use package::{RecvPackage, SendPackage};
