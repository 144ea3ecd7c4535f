//! Session (context) store

pub mod models;
pub mod store;

pub use models::{Session, SessionStats};
pub use store::SessionStore;
