pub mod types;
pub mod config;
pub mod fetcher;
pub mod parser;
pub mod rss_utils;
pub mod traits;
pub mod sources;
pub mod ingest;
pub mod store;
pub mod enrichment;
pub mod pipeline;
pub mod orchestrator;

pub use types::*;
pub use config::AppConfig;
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use traits::FeedSource;
pub use sources::RssFeedSource;
pub use store::{EntryStore, MemoryStore, PgEntryStore, StoreStats};
pub use pipeline::{EnrichmentPipeline, StageReport};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, PassOptions, PassReport};
