//! # loopcall media
//!
//! Capture-side building blocks for a loopcall session: the capture backend
//! seam and its synthetic implementation, device enumeration, live track
//! acquisition and the per-role stream registry that owns every track.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod capture;
pub mod devices;
pub mod error;
pub mod factory;
pub mod registry;

// Re-export main types
pub use capture::{CaptureBackend, CaptureConstraints, DeviceConstraint, SyntheticCapture};
pub use devices::{DeviceCatalog, DeviceList, MediaDevice};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use factory::TrackFactory;
pub use registry::{RoleStream, StreamInfo, StreamRegistry, StreamSnapshot};
