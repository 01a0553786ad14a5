pub mod defs;

pub use defs::{FeedEntry, LiveSourceSpec, SourceItem, Stage};
