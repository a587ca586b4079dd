#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod interaction;
pub mod logging;
pub mod model;
pub mod navigation;
pub mod pager;
pub mod playback;
pub mod session;
pub mod ui;
pub mod video;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
