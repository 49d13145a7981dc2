pub mod config;
pub mod error;
pub mod geo;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::{DirectoryQuery, EntityScorer, FeedComposer, LocationIndexMaintenance};
pub use store::DocumentStore;
