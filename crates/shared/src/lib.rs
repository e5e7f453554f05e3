//! Shared types for the CounselFlow notification socket: wire protocol,
//! notification records and error types.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
