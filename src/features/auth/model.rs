use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Owner identity attached to the request by the bearer-token middleware.
///
/// Handlers receive it through the extractor in `core::extractor` and pass
/// `user_id` explicitly into every owner-scoped service call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Claims carried by access tokens issued for this service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id, serialized as a string
    pub sub: String,
    #[serde(default)]
    pub username: Option<String>,
    pub exp: u64,
    #[serde(default)]
    pub iat: Option<u64>,
}
