//! Access control: admin identity plus a persisted allow-list

pub mod gate;
pub mod store;

pub use gate::{AccessGate, Membership};
pub use store::{AllowListStore, JsonFileStore};
