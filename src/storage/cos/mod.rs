//! Tencent Cloud COS storage backend
//!
//! Request signing, streaming object calls and the StorageProvider
//! implementation, talking to COS over plain HTTP without an external SDK.

pub mod client;
pub mod objects;
pub mod provider;
pub mod request;
pub mod signer;

pub use provider::CosStorage;
