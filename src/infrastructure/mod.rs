pub mod cache;
pub mod circuit_breaker;
pub mod health;
pub mod jwt;
pub mod logging;
pub mod provider_guard;
pub mod retry;
pub mod upstream;
