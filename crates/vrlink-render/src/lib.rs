//! # vrlink-render
//!
//! Decoding, texture management and stereo presentation for the vrlink viewer.
//! Compressed frames enter through [`FrameIngest`], land as decoded images in a
//! latest-wins mailbox, and are drawn side by side each display refresh by a
//! [`DisplaySession`] on the render thread.

pub mod backend;
pub mod decoder;
pub mod ingest;
pub mod presenter;
pub mod session;
pub mod store;

pub use backend::gpu::{WgpuBackend, WgpuTarget};
pub use backend::software::{SoftwareBackend, SoftwareSurface};
pub use backend::{GraphicsBackend, PipelineDescriptor, SurfaceAttributes};
pub use decoder::FrameDecoder;
pub use ingest::{FrameIngest, IngestStats};
pub use presenter::{FixedProjection, IdentityProjection, ProjectionProvider, StereoPresenter};
pub use session::{DisplaySession, SessionState, SessionStats};
pub use store::TextureStore;
