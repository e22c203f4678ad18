pub mod analysis;
pub mod extract;
pub mod metrics;
pub mod prompt;
pub mod providers;

pub use analysis::{analyze, AnalysisError, AnalysisSettings};
pub use extract::extract_json;
