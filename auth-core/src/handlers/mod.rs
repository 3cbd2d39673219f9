pub mod audit;
pub mod auth;
pub mod health;

use service_core::error::AppError;

use crate::services::{AuthorizationError, ServiceError};

/// Fallback for paths with no route: denied like any unlisted route.
pub async fn no_route_policy() -> AppError {
    ServiceError::from(AuthorizationError::NoRoutePolicy).into()
}
