//! Smallcache.
//!
//! Smallcache is a distributed read-through cache. Every shard serves a set of named groups,
//! loads values it owns from the configured sources, and asks the owning peer for all other keys.

#![warn(
    missing_docs,
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;
mod service;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
