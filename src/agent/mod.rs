//! Planning, execution, signal tracking and summarization for one query.

pub mod executor;
pub mod planner;
pub mod prompts;
pub mod signals;
pub mod summarizer;

pub use executor::execute;
pub use planner::{default_plan, normalize_plan, Planner};
pub use signals::derive_signal_statuses;
pub use summarizer::{raw_dump, Summarizer};
