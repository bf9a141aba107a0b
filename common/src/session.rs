use crate::{
    codec::{Message, PixelEdit},
    error::{Error, Result},
    grid::{Dimensions, PixelGrid, Rgba},
    mapper::{CoordinateMapper, Pointer, Viewport},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingSnapshot,
    Live,
    Closed,
}

/// What the renderer has to redraw after an incoming message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Update {
    /// The whole mirror was replaced
    Full,
    /// A single pixel changed
    Pixel(PixelEdit),
    /// A delta arrived before the snapshot and was discarded
    Dropped,
}

/// Client side of the canvas protocol.
///
/// Owns the local mirror of the canvas and the armed color. Local edits are
/// applied to the mirror before they are sent and are never rolled back; the
/// hub's order decides the final color of a contended pixel.
#[derive(Debug)]
pub struct SyncSession {
    dims: Dimensions,
    state: SessionState,
    mirror: Option<PixelGrid>,
    armed: Rgba,
}

impl SyncSession {
    pub fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            state: SessionState::Connecting,
            mirror: None,
            armed: Rgba::from_packed(u32::MAX),
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    /// Local mirror, available once the snapshot has arrived.
    #[inline]
    pub fn mirror(&self) -> Option<&PixelGrid> {
        self.mirror.as_ref()
    }

    /// The transport is up; the hub's snapshot is next.
    pub fn connected(&mut self) -> Result<()> {
        self.expect(SessionState::Connecting)?;
        self.state = SessionState::AwaitingSnapshot;
        Ok(())
    }

    /// Applies a frame received from the hub.
    ///
    /// Malformed frames and out-of-range deltas are returned as errors and
    /// leave the mirror untouched; the session stays usable.
    pub fn receive(&mut self, payload: Vec<u8>) -> Result<Update> {
        if matches!(self.state, SessionState::Connecting | SessionState::Closed) {
            return Err(Error::InvalidState { state: self.state });
        }

        match Message::decode(self.dims, payload)? {
            Message::Snapshot(snapshot) => {
                match self.mirror.as_mut() {
                    Some(mirror) => {
                        debug!("resynchronising mirror from snapshot");
                        mirror.replace(snapshot)?;
                    }
                    None => self.mirror = Some(PixelGrid::from_snapshot(self.dims, snapshot)?),
                }

                self.state = SessionState::Live;
                Ok(Update::Full)
            }
            Message::Delta(edit) => {
                let Some(mirror) = self.mirror.as_mut() else {
                    debug!(?edit, "dropping delta received before the snapshot");
                    return Ok(Update::Dropped);
                };

                edit.apply(mirror)?;
                Ok(Update::Pixel(edit))
            }
        }
    }

    #[inline]
    pub fn armed(&self) -> u32 {
        self.armed.packed()
    }

    pub fn arm(&mut self, color: u32) {
        self.armed = Rgba::from_packed(color);
    }

    /// Paints the armed color at `(x, y)`.
    ///
    /// The edit lands in the mirror immediately; the returned edit is what
    /// has to be sent to the hub.
    pub fn paint(&mut self, x: u16, y: u16) -> Result<PixelEdit> {
        self.expect(SessionState::Live)?;
        let Some(mirror) = self.mirror.as_mut() else {
            return Err(Error::InvalidState { state: self.state });
        };

        let edit = PixelEdit::new(x, y, self.armed.packed());
        edit.apply(mirror)?;
        Ok(edit)
    }

    /// Paints the armed color under the pointer.
    pub fn click(&mut self, pointer: Pointer, viewport: Viewport) -> Result<PixelEdit> {
        self.expect(SessionState::Live)?;
        let (x, y) = CoordinateMapper::new(self.dims)
            .map(pointer, viewport)
            .ok_or(Error::OffCanvas)?;

        self.paint(x, y)
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.mirror = None;
    }

    fn expect(&self, state: SessionState) -> Result<()> {
        if self.state != state {
            return Err(Error::InvalidState { state: self.state });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CANVAS;

    fn live() -> SyncSession {
        let mut session = SyncSession::new(CANVAS);
        session.connected().unwrap();
        let update = session
            .receive(PixelGrid::new(CANVAS).snapshot().into_bytes())
            .unwrap();
        assert_eq!(update, Update::Full);
        session
    }

    fn pixel(session: &SyncSession, x: u16, y: u16) -> u32 {
        session.mirror().unwrap().get(x, y).unwrap().packed()
    }

    #[test]
    fn state_machine() {
        let mut session = SyncSession::new(CANVAS);
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(matches!(
            session.receive(vec![0; 8]),
            Err(Error::InvalidState {
                state: SessionState::Connecting
            })
        ));

        session.connected().unwrap();
        assert_eq!(session.state(), SessionState::AwaitingSnapshot);
        assert!(session.mirror().is_none());
        assert!(session.paint(1, 1).is_err());

        session
            .receive(PixelGrid::new(CANVAS).snapshot().into_bytes())
            .unwrap();
        assert_eq!(session.state(), SessionState::Live);

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.mirror().is_none());
        assert!(session.receive(vec![0; 8]).is_err());
    }

    #[test]
    fn delta_before_snapshot_is_dropped() {
        let mut session = SyncSession::new(CANVAS);
        session.connected().unwrap();

        let delta = PixelEdit::new(5, 5, 0xFF0000FF).encode().to_vec();
        assert_eq!(session.receive(delta).unwrap(), Update::Dropped);
        assert_eq!(session.state(), SessionState::AwaitingSnapshot);

        session
            .receive(PixelGrid::new(CANVAS).snapshot().into_bytes())
            .unwrap();
        assert_eq!(pixel(&session, 5, 5), 0);
    }

    #[test]
    fn snapshot_materialises_mirror() {
        let mut remote = PixelGrid::new(CANVAS);
        PixelEdit::new(10, 20, 0x12345678).apply(&mut remote).unwrap();

        let mut session = SyncSession::new(CANVAS);
        session.connected().unwrap();
        session.receive(remote.snapshot().into_bytes()).unwrap();

        assert_eq!(session.mirror().unwrap().as_bytes(), remote.as_bytes());
    }

    #[test]
    fn remote_deltas_apply_in_order() {
        let mut session = live();
        let a = PixelEdit::new(5, 5, 0xFF0000FF);
        let b = PixelEdit::new(5, 5, 0x00FF00FF);

        assert_eq!(session.receive(a.encode().to_vec()).unwrap(), Update::Pixel(a));
        assert_eq!(session.receive(b.encode().to_vec()).unwrap(), Update::Pixel(b));
        assert_eq!(pixel(&session, 5, 5), 0x00FF00FF);
    }

    #[test]
    fn malformed_frame_is_not_fatal() {
        let mut session = live();
        let before = session.mirror().unwrap().clone();

        assert!(matches!(
            session.receive(vec![5, 0, 5, 0, 0xFF, 0xFF, 0xFF]),
            Err(Error::MalformedMessage { len: 7 })
        ));
        assert!(matches!(
            session.receive(PixelEdit::new(0, 1000, 1).encode().to_vec()),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(session.state(), SessionState::Live);
        assert_eq!(session.mirror().unwrap(), &before);
    }

    #[test]
    fn paint_is_applied_optimistically() {
        let mut session = live();
        session.arm(0xFF00FFFF);

        let edit = session.paint(7, 9).unwrap();
        assert_eq!(edit, PixelEdit::new(7, 9, 0xFF00FFFF));
        assert_eq!(pixel(&session, 7, 9), 0xFF00FFFF);

        assert!(matches!(session.paint(1000, 0), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn click_maps_through_viewport() {
        let mut session = live();
        session.arm(0x0000FFFF);
        let viewport = Viewport::new(0.0, 0.0, 500.0, 500.0);

        let edit = session.click(Pointer::new(250.0, 250.0), viewport).unwrap();
        assert_eq!((edit.x, edit.y, edit.color), (500, 500, 0x0000FFFF));
        assert_eq!(pixel(&session, 500, 500), 0x0000FFFF);

        assert!(matches!(
            session.click(Pointer::new(600.0, 10.0), viewport),
            Err(Error::OffCanvas)
        ));
    }

    #[test]
    fn resync_replaces_mirror() {
        let mut session = live();
        session.paint(1, 1).unwrap();

        let mut remote = PixelGrid::new(CANVAS);
        PixelEdit::new(2, 2, 0xABCDEF01).apply(&mut remote).unwrap();
        assert_eq!(
            session.receive(remote.snapshot().into_bytes()).unwrap(),
            Update::Full
        );
        assert_eq!(session.mirror().unwrap().as_bytes(), remote.as_bytes());
    }
}
