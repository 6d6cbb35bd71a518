pub mod types;
pub mod step;
pub mod workflow;
pub mod control;
pub mod events;
pub mod error;
pub mod logger;
pub mod settings;
pub mod sleep;
pub mod platform;
pub mod locate;
pub mod telemetry;
pub mod handlers;
pub mod executor;
