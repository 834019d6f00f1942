//! Request/response header and JSON body transformation (spec §4.6).

mod header;
mod json;
mod middleware;

pub use header::{HeaderOp, HeaderTransform};
pub use json::{JsonOp, JsonTransform};
pub use middleware::{transform_middleware, Pattern, TransformCondition, TransformMiddlewareConfig, TransformRule};
