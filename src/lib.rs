//! proxysync renders HAProxy and Nginx configuration from discovered backends.
//!
//! Each generator turns the current watchers into a complete config file,
//! writes it only when it changed (validating it first), and reloads the
//! proxy under a jittered rate limiter.
//!
//! - [`models`] -- backends, watchers and backend ordering.
//! - [`sync`] -- the generators, the diff-gated writer, the restart
//!   scheduler and the driver loop.
//! - [`error`] -- configuration and I/O errors.
//! - [`config_cli`] / [`logging`] -- process setup.

pub mod config_cli;
pub mod error;
pub mod logging;
pub mod models;
pub mod sync;
