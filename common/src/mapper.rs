use crate::grid::Dimensions;

/// Pointer position in client (screen) space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pointer {
    pub client_x: f64,
    pub client_y: f64,
}

impl Pointer {
    pub const fn new(client_x: f64, client_y: f64) -> Self {
        Self { client_x, client_y }
    }
}

/// On-screen bounding box of the rendered canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Maps rendered positions onto canvas cells, independent of how the canvas
/// is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinateMapper {
    dims: Dimensions,
}

impl CoordinateMapper {
    pub const fn new(dims: Dimensions) -> Self {
        Self { dims }
    }

    /// Returns `None` when the pointer lands outside the canvas or the
    /// viewport has no area.
    pub fn map(&self, pointer: Pointer, viewport: Viewport) -> Option<(u16, u16)> {
        let x = axis(
            pointer.client_x - viewport.left,
            viewport.width,
            self.dims.width,
        )?;
        let y = axis(
            pointer.client_y - viewport.top,
            viewport.height,
            self.dims.height,
        )?;

        Some((x, y))
    }
}

fn axis(offset: f64, rendered: f64, logical: u16) -> Option<u16> {
    if !(rendered > 0.0) {
        return None;
    }

    let cell = (offset * (f64::from(logical) / rendered)).floor();
    if !(0.0..f64::from(logical)).contains(&cell) {
        return None;
    }

    Some(cell as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CANVAS;

    const MAPPER: CoordinateMapper = CoordinateMapper::new(CANVAS);

    #[test]
    fn half_size_canvas() {
        let viewport = Viewport::new(0.0, 0.0, 500.0, 500.0);
        assert_eq!(
            MAPPER.map(Pointer::new(250.0, 250.0), viewport),
            Some((500, 500))
        );
        assert_eq!(MAPPER.map(Pointer::new(0.0, 0.0), viewport), Some((0, 0)));
        assert_eq!(
            MAPPER.map(Pointer::new(499.9, 499.9), viewport),
            Some((999, 999))
        );
    }

    #[test]
    fn offset_viewport() {
        let viewport = Viewport::new(100.0, 40.0, 2000.0, 1000.0);
        assert_eq!(
            MAPPER.map(Pointer::new(101.0, 41.0), viewport),
            Some((0, 1))
        );
        assert_eq!(
            MAPPER.map(Pointer::new(1100.0, 540.0), viewport),
            Some((500, 500))
        );
    }

    #[test]
    fn outside_is_rejected() {
        let viewport = Viewport::new(10.0, 10.0, 500.0, 500.0);
        assert_eq!(MAPPER.map(Pointer::new(9.0, 100.0), viewport), None);
        assert_eq!(MAPPER.map(Pointer::new(100.0, 9.9), viewport), None);
        assert_eq!(MAPPER.map(Pointer::new(510.0, 100.0), viewport), None);
        assert_eq!(MAPPER.map(Pointer::new(100.0, 510.0), viewport), None);
    }

    #[test]
    fn degenerate_viewport() {
        let pointer = Pointer::new(0.0, 0.0);
        assert_eq!(MAPPER.map(pointer, Viewport::new(0.0, 0.0, 0.0, 10.0)), None);
        assert_eq!(
            MAPPER.map(pointer, Viewport::new(0.0, 0.0, 10.0, f64::NAN)),
            None
        );
    }
}
