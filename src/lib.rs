// Public API - the runner plus what the CLI needs to configure it
pub mod config;
pub mod dump;
pub mod error;
pub mod generate;
pub mod runner;
pub mod telemetry;

// Subsystems, public so their types can appear in the runner's API
pub mod db;
pub mod formats;
pub mod load;
