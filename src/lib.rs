// Public API - the runner drives whole-prefix loads; the other modules
// are exposed for driving a single load programmatically
pub mod config;
pub mod error;
pub mod formats;
pub mod frame;
pub mod io;
pub mod mapping;
pub mod runner;
pub mod warehouse;

// Internal modules
mod stage;
