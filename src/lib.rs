//! Per-guild Discord music playback.
//!
//! See [`audio`] for the playback engine and [`bot`] for the Discord side.

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod sources;
pub mod storage;
pub mod ui;
