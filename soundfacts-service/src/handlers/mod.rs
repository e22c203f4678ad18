pub mod app;
pub mod metrics;
pub mod soundfacts;

pub use app::{health_check, index, not_found, readiness_check};
pub use metrics::metrics_handler;
pub use soundfacts::{cors_origin_middleware, soundfacts, CorsPolicy, HandlerResponse, SoundFactsHandler};
