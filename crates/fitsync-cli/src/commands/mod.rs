pub mod config;
pub mod queue;
pub mod state;
pub mod status;
pub mod watch;
