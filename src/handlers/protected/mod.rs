// Protected handlers: session token required (`Authorization: Bearer`).
// Routes live under /api and receive the caller as `Extension<AuthUser>`.
pub mod keys;
pub mod whoami;

pub use keys::{create_key, delete_key, list_keys, revoke_key};
pub use whoami::whoami;
