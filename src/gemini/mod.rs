//! Client for the Gemini generative language REST API.
mod core;
mod error;
mod session;

pub use self::core::*;
pub use error::GeminiError;
pub use session::ChatSession;
