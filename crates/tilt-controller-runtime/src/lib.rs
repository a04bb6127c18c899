mod client;
mod config;
mod controller;
mod deferred;
mod error;
mod manager;
mod queue;
mod reconciler;

pub use client::*;
pub use config::*;
pub use controller::ControllerState;
pub use deferred::*;
pub use error::*;
pub use manager::*;
pub use queue::WorkQueue;
pub use reconciler::*;

pub use tilt_stream_model::core;
pub use tilt_stream_model::store;
