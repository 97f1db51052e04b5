pub mod canonical;
pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod reconcile;
pub mod sender;
pub mod snapshot;
pub mod store;
pub mod templates;
pub mod types;

pub use error::{Result, SitekickError};
