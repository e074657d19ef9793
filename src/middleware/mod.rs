pub mod auth;
pub mod rate_limit;
pub mod response;

pub use auth::{api_key_auth_middleware, bearer_auth_middleware, AuthUser, API_KEY_HEADER};
pub use rate_limit::project_rate_limit_middleware;
pub use response::{ApiResponse, ApiResult};
