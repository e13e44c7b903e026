//! Windowed demos for Zenith.
//!
//! [`run_demo`] owns the window, the device, the swapchain and a render pass,
//! and drives a [`Demo`] once per frame. A demo only creates its pipeline and
//! resources and records its draws.

mod app;
mod runner;
pub mod scene;
pub mod shaders;

pub use app::{Demo, DemoContext};
pub use runner::{run_demo, DemoConfig};
