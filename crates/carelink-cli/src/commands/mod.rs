pub mod appointment;
pub mod common;
pub mod completions;
pub mod config;
pub mod consultation;
pub mod patient;
pub mod queue;
pub mod sync;
pub mod transcribe;
