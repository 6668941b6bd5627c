//! wgpu backend for the lumen render pipeline.
//!
//! [`WgpuDevice`] implements [`lumen_render::Device`] on top of a window
//! surface. A linked program becomes one render pipeline; each frame is one
//! render pass, recorded between `clear` and `present`.
//!
//! # Invariants
//! - Depth is Depth32Float, compared with `Less`, cleared to 1.0 every frame.
//! - Presentation uses `AutoVsync`; `present` is where the loop waits.
//! - wgpu validation errors are caught with error scopes and reported as
//!   compile logs, link logs or `DeviceError`s, never as panics.

mod gpu;

pub use gpu::WgpuDevice;
