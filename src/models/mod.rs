//! Domain and transport models for the prop engine
//!
//! `PropResult` is the unit the engine computes, validates and caches; the
//! remaining types are the shapes handed back to callers.

pub mod prop;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use prop::PropResult;
pub use requests::{validate_id, ClearQuery, PropsQuery};
pub use responses::{
    CircuitsResponse, ClearResponse, ErrorResponse, HealthResponse, InvalidateResponse,
    PropsResponse, ResponseStatus, Source,
};
