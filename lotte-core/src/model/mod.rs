pub mod entry;
pub mod snapshot;
pub mod stats;
