use crate::{
    codec::DELTA_LEN,
    error::{Error, Result},
};
use std::fmt;

/// Bytes per pixel (R, G, B, A)
pub const CHANNELS: usize = 4;

/// The canvas every endpoint is compiled against. Not negotiated.
pub const CANVAS: Dimensions = Dimensions::new(1000, 1000);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u16,
    pub height: u16,
}

impl Dimensions {
    /// # Panics
    ///
    /// Panics on empty shapes and on shapes whose snapshot would be
    /// indistinguishable from a delta on the wire.
    pub const fn new(width: u16, height: u16) -> Self {
        assert!(width > 0 && height > 0, "canvas must not be empty");
        assert!(
            width as usize * height as usize * CHANNELS != DELTA_LEN,
            "snapshot length collides with the delta length"
        );

        Self { width, height }
    }

    #[inline]
    pub const fn snapshot_len(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }

    #[inline]
    pub const fn contains(&self, x: u16, y: u16) -> bool {
        x < self.width && y < self.height
    }

    fn offset(&self, x: u16, y: u16) -> Result<usize> {
        if !self.contains(x, y) {
            return Err(Error::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }

        Ok((y as usize * self.width as usize + x as usize) * CHANNELS)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgba(pub [u8; CHANNELS]);

impl Rgba {
    #[inline]
    pub const fn from_packed(color: u32) -> Self {
        Self(color.to_le_bytes())
    }

    #[inline]
    pub const fn packed(self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

/// Full-grid payload. Its length always equals the snapshot length of the
/// dimensions it was built for.
#[derive(Clone, PartialEq, Eq)]
pub struct Snapshot(Vec<u8>);

impl Snapshot {
    pub(crate) fn from_bytes(dims: Dimensions, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != dims.snapshot_len() {
            return Err(Error::MalformedMessage { len: bytes.len() });
        }

        Ok(Self(bytes))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Snapshot").field(&self.0.len()).finish()
    }
}

/// Row-major RGBA bitmap, origin top-left.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelGrid {
    dims: Dimensions,
    // layout: Y(X(rgba)), always `dims.snapshot_len()` bytes
    data: Vec<u8>,
}

impl PixelGrid {
    pub fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            data: vec![0; dims.snapshot_len()],
        }
    }

    pub fn from_snapshot(dims: Dimensions, snapshot: Snapshot) -> Result<Self> {
        let mut grid = Self::new(dims);
        grid.replace(snapshot)?;
        Ok(grid)
    }

    #[inline]
    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn get(&self, x: u16, y: u16) -> Result<Rgba> {
        let offset = self.dims.offset(x, y)?;
        let mut pixel = [0; CHANNELS];
        pixel.copy_from_slice(&self.data[offset..offset + CHANNELS]);
        Ok(Rgba(pixel))
    }

    /// Overwrites the whole pixel. Returns whether the stored color changed.
    pub fn set(&mut self, x: u16, y: u16, color: Rgba) -> Result<bool> {
        let offset = self.dims.offset(x, y)?;
        let pixel = &mut self.data[offset..offset + CHANNELS];
        if pixel == color.0 {
            return Ok(false);
        }

        pixel.copy_from_slice(&color.0);
        Ok(true)
    }

    /// Full-grid replace. The grid is untouched if the snapshot was built for
    /// different dimensions.
    pub fn replace(&mut self, snapshot: Snapshot) -> Result<()> {
        if snapshot.0.len() != self.data.len() {
            return Err(Error::MalformedMessage {
                len: snapshot.0.len(),
            });
        }

        self.data = snapshot.0;
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.data.clone())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for PixelGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelGrid")
            .field("dims", &self.dims)
            .finish_non_exhaustive()
    }
}
