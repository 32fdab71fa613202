//! Roster directory service API module
//!
//! Provides the `DirectoryApi` trait covering the user, group, membership
//! and event operations the importer needs, plus a REST client backed by
//! reqwest. Import logic depends on the trait only, so tests run against a
//! scripted in-memory directory.

pub mod client;
pub mod error;
pub mod models;
pub mod rest;

#[cfg(test)]
pub mod testing;

pub use client::DirectoryApi;
pub use error::ApiError;
pub use models::{
    EventRecord, GroupJoin, GroupRecord, NewChild, NewEvent, NewGroup, NewUser, PaymentMethod,
    UserRecord,
};
pub use rest::RestDirectoryClient;
