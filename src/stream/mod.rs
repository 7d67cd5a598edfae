pub mod feed;
pub mod strategy;
pub mod worker;

pub use feed::{AtlasStreamFeed, FeedError, FeedEvent, ResultFeed};
pub use strategy::{StrategySettings, StreamingStrategy};
