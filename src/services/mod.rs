pub mod composer;
pub mod location_index;
pub mod profile;
pub mod scorer;
pub mod signals;

pub use composer::FeedComposer;
pub use location_index::LocationIndexMaintenance;
pub use scorer::{DirectoryQuery, EntityScorer};
