//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `ItemState`: lifecycle of a document in the download queue
//! - `CrawlPhase`: the orchestrator's position in a crawl run

mod crawl_phase;
mod item_state;

// Re-export main types
pub use crawl_phase::CrawlPhase;
pub use item_state::ItemState;
