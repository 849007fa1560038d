pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod providers;
pub mod tools;
pub mod types;

pub use config::Config;
pub use engine::{AgentState, ControlLoop, SessionOutcome, SessionStatus};
