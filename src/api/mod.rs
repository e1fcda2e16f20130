pub mod routes;
mod server;
pub use server::{app, init_tracing, serve};
pub mod public;
mod state;
pub use state::{AppState, SharedSession, spawn_session_sweeper};
