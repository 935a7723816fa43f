//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the playback engine and
//! platform-specific implementations. Each trait represents a capability the
//! engine requires but that must be provided differently per platform
//! (desktop, mobile, embedded, test harness).
//!
//! ## Traits
//!
//! ### Audio Output
//! - [`OutputDevice`](device::OutputDevice) - The shared output connection:
//!   open/suspend/resume/close lifecycle, master gain, render-node factory
//! - [`RenderNode`](device::RenderNode) - A low-level playback primitive
//!   (single-use buffer node or reusable streaming element)
//!
//! ### Resource Acquisition
//! - [`MediaFetcher`](fetch::MediaFetcher) - Async byte transfer for a
//!   resource identifier (URL, file path, inline data)
//! - [`DecodeService`](decode::DecodeService) - Decodes encoded bytes into
//!   [`DecodedAudio`](audio::DecodedAudio), probes codec support
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Monotonic time source and async sleep for
//!   deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Platform implementations should convert platform-specific errors to
//! `BridgeError` with actionable messages.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod audio;
pub mod decode;
pub mod device;
pub mod error;
pub mod fetch;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use audio::{AudioCodec, AudioFormat, DecodedAudio};
pub use decode::DecodeService;
pub use device::{DeviceDescriptor, OutputDevice, RenderMode, RenderNode, RenderParams, RenderSource};
pub use fetch::MediaFetcher;
pub use time::Clock;
