//! Class rosters and daily attendance with swappable storage backends.

pub mod config;
pub mod csv;
pub mod dates;
pub mod error;
pub mod html;
pub mod report;
pub mod server;
pub mod setup;
pub mod sheet;
pub mod store;
pub mod types;
