//! Polling data feeds
//!
//! A feed owns one recurring query against one cluster member. Each poll
//! extracts the display columns from the first result record, runs the
//! augmentation pipeline, applies aliases and pushes the result into a
//! bounded ring buffer before notifying listeners.

mod builder;
mod key;
mod poller;
mod ring;
mod transform;


pub use builder::{FeedBuilder, FeedConfig, DEFAULT_RATE, DEFAULT_WINDOW_WIDTH};
pub use key::{normalize_query, FeedKey};
pub use poller::{Feed, FeedState, FeedStats, LatencyStats, Listener};
pub use ring::RingBuffer;
pub use transform::{AliasMap, AugmentFn};
