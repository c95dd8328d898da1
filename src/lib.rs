#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod catalog;
pub mod config;
pub mod gotrue;
pub mod identity;
pub mod logging;
pub mod nav;
pub mod player;
pub mod session;
pub mod state;
pub mod storage;
pub mod theme;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
