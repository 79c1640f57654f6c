//! presenced — attendance recognition daemon.
//!
//! Wires the capture loop, the incident recorder, and the roster admin
//! surface over a document store, behind a dev auth session. The vision
//! backend is a trait seam; the stock binary runs the offline null
//! backend and real deployments plug a camera and model engine in.

pub mod admin;
pub mod auth;
pub mod config;
pub mod context;
pub mod export;
pub mod recorder;
pub mod scanner;
pub mod wire;

pub use config::Config;
pub use context::AppContext;
