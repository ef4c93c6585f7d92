pub mod feed;
pub mod normalizer;
pub mod pipeline;

pub use feed::{run_feed, ConnectionState, FeedConfig};
pub use normalizer::Normalizer;
pub use pipeline::Pipeline;
