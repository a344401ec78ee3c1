//! Usage tracking and goal evaluation for a desktop launcher.
//!
//! The engine watches the OS process list for configured applications, infers
//! run sessions, keeps cumulative usage history on disk, and evaluates
//! user-defined usage goals into deduplicated alerts. The launcher's UI is a
//! thin consumer of [engine::Engine]; the bundled CLI runs the tracker as a
//! daemon and inspects the recorded data.

pub mod cli;
pub mod engine;
pub mod process_api;
pub mod utils;
