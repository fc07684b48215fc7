//! HTTP front door
//!
//! - `POST /api/chat` runs a message through the dispatch pipeline
//! - `GET /v1/health` reports liveness
//! - `GET /v1/devices` lists the device whitelist

mod routes;
mod server;

pub use server::{run, AppState};
