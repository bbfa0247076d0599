// SPDX-License-Identifier: MPL-2.0

//! Frame sources
//!
//! - [`camera`]: frame types, pixel layouts and the capture loop
//! - [`virtual_camera`]: file-backed camera used by the CLI and tests

pub mod camera;
pub mod virtual_camera;
