pub mod channels;
pub mod dispatcher;
pub mod formatter;
pub mod rate_limiter;

pub use channels::{build_adapters, ChannelAdapter};
pub use dispatcher::Dispatcher;
pub use rate_limiter::TokenBucket;
