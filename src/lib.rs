//! Lyrics registry library - shared modules for both binaries.

pub mod config;
pub mod error;
pub mod lrc;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod request;
pub mod safety;
pub mod scoring;
pub mod sources;
pub mod store;
pub mod sync;
