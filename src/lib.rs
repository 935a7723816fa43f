//! Workspace umbrella crate.
//!
//! Host applications can depend on `spc-workspace` and enable the documented
//! features instead of wiring each workspace crate individually. The
//! `engine` feature pulls in the playback engine, `desktop-bridges` the
//! native platform adapters.

#[cfg(feature = "engine")]
pub use core_playback;

#[cfg(feature = "desktop-bridges")]
pub use bridge_desktop;
