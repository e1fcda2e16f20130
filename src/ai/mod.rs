pub mod catalog;
pub mod chat;
pub mod render;
pub mod retry;
