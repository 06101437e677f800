//! # vrlink-core
//!
//! Core types for the vrlink stereo viewer.
//! This crate holds what every other vrlink crate shares: decoded and
//! compressed frames, eye slots, viewport geometry, the latest-wins mailbox
//! used to hand frames to the render thread, stream framing, configuration
//! and the error taxonomy.

pub mod config;
pub mod error;
pub mod frame;
pub mod mailbox;
pub mod packet;
pub mod pool;
pub mod viewport;

pub use config::{DeliveryMode, FilterMode, ViewerConfig};
pub use error::{ContextStage, StereoError, StereoResult};
pub use frame::{rgb_len, CompressedFrame, Eye, RawImage};
pub use mailbox::{Mailbox, StereoMailbox};
pub use packet::{FramePacket, PacketHeader, PacketReader};
pub use pool::BufferPool;
pub use viewport::{EyeRect, ViewportGeometry};
