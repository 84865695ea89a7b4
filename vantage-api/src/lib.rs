//! Vantage API - Service Facade and REST Routes
//!
//! Wires the cache, the request coordinator, and the scrape/analyze
//! collaborators into the analysis pipeline, and exposes it over HTTP.
//!
//! ```ignore
//! let config = ServiceConfig::from_env();
//! init_from_config(&config)?;
//!
//! let service = Arc::new(VantageService::new(config, scraper, analyzer)?);
//! service.start_sweeper();
//! let app = create_api_router(Arc::clone(&service));
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod routes;
pub mod service;
pub mod telemetry;

pub use config::ServiceConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use orchestrator::AnalysisOrchestrator;
pub use routes::create_api_router;
pub use service::{VantageService, CLEAR_ALL};
pub use telemetry::{init_from_config, init_tracing};
