// Handlers by security tier:
// Public (no auth) -> Protected (session token) -> SDK (API key + rate limit)
pub mod protected;
pub mod public;
pub mod sdk;
