//! Domain models for the Sound Facts service.

pub mod analysis;

pub use analysis::{AnalysisPayload, AnalysisRequest, AnalysisResult, MissingFieldsError};
