pub mod classifier;
pub mod dedup;
pub mod rules;

pub use classifier::classify;
pub use dedup::Deduplicator;
pub use rules::RuleEngine;
