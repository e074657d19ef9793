// Public handlers: no authentication. Token acquisition and health.
pub mod accounts;
pub mod health;

pub use accounts::{login, signup, validate_key};
pub use health::health;
