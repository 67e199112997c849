//! Recording job supervisor for a live TV client.
//!
//! A recording is either a local capture (an ffmpeg process writing the
//! channel's stream to a file) or a remote entry on a TVHeadend backend's
//! DVR. The [`recording::Supervisor`] owns every in-flight job, watches
//! local captures for exits and stalled output, and stops jobs on request.

pub mod capture;
pub mod catalog;
pub mod config;
pub mod dvr;
pub mod error;
pub mod logging;
pub mod recording;

pub use error::{Error, Result};
