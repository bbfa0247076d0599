// SPDX-License-Identifier: MPL-2.0

//! Camera frame types and the capture loop
//!
//! A camera is anything implementing [`FrameSource`]. The
//! [`CaptureLoopController`] drives it on a worker thread and hands each
//! frame to the analyzer, which releases it back through the frame's hook.

pub mod frame_loop;
pub mod types;

pub use frame_loop::{CaptureLoopController, FrameSource, LoopAction, validate_source_format};
pub use types::*;
