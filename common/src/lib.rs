#[macro_use]
extern crate tracing;

pub mod codec;
pub mod error;
pub mod grid;
pub mod mapper;
pub mod session;
pub mod transport;

pub use self::{
    codec::{DELTA_LEN, Message, PixelEdit},
    error::{Error, Result},
    grid::{CANVAS, Dimensions, PixelGrid, Rgba, Snapshot},
    mapper::{CoordinateMapper, Pointer, Viewport},
    session::{SessionState, SyncSession, Update},
};

use rkyv::{Archive, Deserialize, Serialize};

#[derive(Archive, Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct StencilPixel {
    /// packed RGBA, little-endian (byte 0 = red)
    pub color: u32,
    pub draw: bool,
}

#[derive(Archive, Clone, Debug, Deserialize, Serialize)]
pub struct Stencil {
    pub width: u16,
    pub height: u16,
    // layout: row-major, `width * height` entries
    pub pixels: Vec<StencilPixel>,
}
