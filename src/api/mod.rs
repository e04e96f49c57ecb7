pub mod admin;
pub mod handler;
pub mod models;
pub mod streaming;
pub mod websocket;
