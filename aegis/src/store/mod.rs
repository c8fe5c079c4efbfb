//! Alert/user record store
//!
//! The coordinator only needs point lookups of reporter profiles and a
//! status write on alerts. The change feed lives in [`crate::feed`].

mod error;
mod http;
mod memory;
mod traits;

pub use error::StoreError;
pub use http::HttpRecordStore;
pub use memory::MemoryStore;
pub use traits::{AlertStore, ProfileStore};
