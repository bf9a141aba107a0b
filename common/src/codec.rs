//! Binary wire format.
//!
//! Two message shapes share one channel and are told apart by length alone:
//!
//! ```text
//! snapshot: width * height * 4 bytes, row-major RGBA
//! delta:    [x:u16 LE] [y:u16 LE] [color:u32 LE, byte 0 = R]
//! ```
//!
//! Any other length is malformed. The shape is resolved once, in
//! [`Message::decode`], and callers only ever see the tagged [`Message`].

use crate::{
    error::{Error, Result},
    grid::{Dimensions, PixelGrid, Rgba, Snapshot},
};

/// Length of an encoded [`PixelEdit`]
pub const DELTA_LEN: usize = 2 + 2 + 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelEdit {
    pub x: u16,
    pub y: u16,
    /// packed RGBA, little-endian (byte 0 = red)
    pub color: u32,
}

impl PixelEdit {
    #[inline]
    pub const fn new(x: u16, y: u16, color: u32) -> Self {
        Self { x, y, color }
    }

    #[inline]
    pub const fn rgba(&self) -> Rgba {
        Rgba::from_packed(self.color)
    }

    pub fn encode(&self) -> [u8; DELTA_LEN] {
        let mut buf = [0; DELTA_LEN];
        buf[0..2].copy_from_slice(&self.x.to_le_bytes());
        buf[2..4].copy_from_slice(&self.y.to_le_bytes());
        buf[4..8].copy_from_slice(&self.color.to_le_bytes());
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let Ok(buf) = <&[u8; DELTA_LEN]>::try_from(payload) else {
            return Err(Error::MalformedMessage { len: payload.len() });
        };

        Ok(Self {
            x: u16::from_le_bytes([buf[0], buf[1]]),
            y: u16::from_le_bytes([buf[2], buf[3]]),
            color: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Writes the edit into `grid`. Fails without touching the grid when the
    /// coordinates are out of range.
    pub fn apply(&self, grid: &mut PixelGrid) -> Result<bool> {
        grid.set(self.x, self.y, self.rgba())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Snapshot(Snapshot),
    Delta(PixelEdit),
}

impl Message {
    /// Resolves the shape of `payload` for a canvas of `dims`.
    pub fn decode(dims: Dimensions, payload: Vec<u8>) -> Result<Self> {
        match payload.len() {
            len if len == dims.snapshot_len() => {
                Snapshot::from_bytes(dims, payload).map(Self::Snapshot)
            }
            DELTA_LEN => PixelEdit::decode(&payload).map(Self::Delta),
            len => Err(Error::MalformedMessage { len }),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Snapshot(snapshot) => snapshot.into_bytes(),
            Self::Delta(edit) => edit.encode().to_vec(),
        }
    }

    #[inline]
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Self::Snapshot(..))
    }
}

impl From<PixelEdit> for Message {
    fn from(edit: PixelEdit) -> Self {
        Self::Delta(edit)
    }
}

impl From<Snapshot> for Message {
    fn from(snapshot: Snapshot) -> Self {
        Self::Snapshot(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CANVAS;

    #[test]
    fn delta_layout() {
        let edit = PixelEdit::new(0x0102, 0x0304, 0xAABBCCDD);
        assert_eq!(
            edit.encode(),
            [0x02, 0x01, 0x04, 0x03, 0xDD, 0xCC, 0xBB, 0xAA]
        );
        assert_eq!(edit.rgba().0, [0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn delta_round_trip_at_the_edges() {
        for edit in [
            PixelEdit::new(0, 0, 0),
            PixelEdit::new(999, 999, u32::MAX),
            PixelEdit::new(5, 5, 0xFF0000FF),
            PixelEdit::new(999, 0, 0x00FF00FF),
        ] {
            let decoded = Message::decode(CANVAS, edit.encode().to_vec()).unwrap();
            assert_eq!(decoded, Message::Delta(edit));
            assert_eq!(decoded.into_bytes(), edit.encode().to_vec());
        }
    }

    #[test]
    fn snapshot_is_recognised_by_length() {
        let mut grid = PixelGrid::new(CANVAS);
        for i in 0..1000u16 {
            PixelEdit::new(i, 999 - i, 0x11223344u32.wrapping_mul(i as u32 + 1))
                .apply(&mut grid)
                .unwrap();
        }

        let bytes = Message::from(grid.snapshot()).into_bytes();
        assert_eq!(bytes.len(), 4_000_000);

        let Message::Snapshot(snapshot) = Message::decode(CANVAS, bytes).unwrap() else {
            panic!("expected a snapshot");
        };
        let restored = PixelGrid::from_snapshot(CANVAS, snapshot).unwrap();
        assert_eq!(restored.as_bytes(), grid.as_bytes());
    }

    #[test]
    fn seven_bytes_is_malformed() {
        let err = Message::decode(CANVAS, vec![1, 0, 1, 0, 0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { len: 7 }));
    }

    #[test]
    fn other_lengths_are_malformed() {
        for len in [0, 1, 9, 12, 4_000_000 - 1, 4_000_000 + 8] {
            assert!(matches!(
                Message::decode(CANVAS, vec![0; len]),
                Err(Error::MalformedMessage { len: l }) if l == len
            ));
        }
    }

    #[test]
    fn oversized_delta_is_not_sliced() {
        let mut payload = PixelEdit::new(5, 5, 0xFF0000FF).encode().to_vec();
        payload.extend_from_slice(&[0; 4]);

        assert!(PixelEdit::decode(&payload).is_err());
        assert!(PixelEdit::decode(&payload[..7]).is_err());
    }

    #[test]
    fn out_of_range_delta_leaves_grid_alone() {
        let mut grid = PixelGrid::new(CANVAS);
        let err = PixelEdit::new(1000, 3, 0xFFFFFFFF).apply(&mut grid).unwrap_err();

        assert!(matches!(err, Error::OutOfBounds { .. }));
        assert!(grid.as_bytes().iter().all(|b| *b == 0));
    }
}
