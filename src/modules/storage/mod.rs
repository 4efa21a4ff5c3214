//! Storage module for file management
//!
//! Local-disk placement of uploads (per owner and day), public URL
//! resolution, and content sniffing of stored bytes.

mod local_storage;

pub mod sniffer;

pub use local_storage::LocalStorage;
