//! Vitrine Kernel Library
//!
//! Plugin lifecycle management and record tagging for a collections CMS.
//! The `vitrine` binary drives both from the command line.

pub mod config;
pub mod db;
pub mod hook;
pub mod plugin;
pub mod state;
pub mod tagging;
