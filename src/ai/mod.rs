//! AI access for the pipeline
//!
//! - `RateLimiter`: sliding-window admission shared by every AI call
//! - `AiClient`: rate-limited, jittered wrapper over a generation transport
//! - `OpenRouterTransport`: the HTTP transport used in production

mod client;
mod openrouter;
pub mod prompts;
mod rate_limiter;

pub use client::{AiClient, GenerationConfig, GenerationTransport, JitterBand};
pub use openrouter::{DEFAULT_API_URL, OpenRouterTransport};
pub use rate_limiter::RateLimiter;
