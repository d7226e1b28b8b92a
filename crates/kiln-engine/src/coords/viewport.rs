use super::Extent;

/// Viewport rectangle in target pixels (`x`, `y`, `width`, `height`).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Viewport covering the whole of `extent`.
    #[inline]
    pub fn full(extent: Extent) -> Self {
        Self::new(0.0, 0.0, extent.width as f32, extent.height as f32)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Intersects the viewport with `[0, extent]`.
    ///
    /// Non-finite input collapses to an empty viewport.
    pub fn clamped_to(self, extent: Extent) -> Self {
        if !self.is_finite() {
            return Self::default();
        }
        let (ew, eh) = (extent.width as f32, extent.height as f32);
        let x0 = self.x.clamp(0.0, ew);
        let y0 = self.y.clamp(0.0, eh);
        let x1 = (self.x + self.width).clamp(0.0, ew);
        let y1 = (self.y + self.height).clamp(0.0, eh);
        Self::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }

    /// Packs as `[x, y, width, height]` for uniform upload.
    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_inside_is_identity() {
        let v = Viewport::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(v.clamped_to(Extent::new(640, 480)), v);
    }

    #[test]
    fn clamp_trims_overhang() {
        let v = Viewport::new(600.0, -10.0, 100.0, 100.0);
        assert_eq!(
            v.clamped_to(Extent::new(640, 480)),
            Viewport::new(600.0, 0.0, 40.0, 90.0)
        );
    }

    #[test]
    fn clamp_outside_is_empty() {
        let v = Viewport::new(700.0, 0.0, 10.0, 10.0);
        assert!(v.clamped_to(Extent::new(640, 480)).is_empty());
    }

    #[test]
    fn clamp_nan_is_empty() {
        let v = Viewport::new(f32::NAN, 0.0, 10.0, 10.0);
        assert!(v.clamped_to(Extent::new(640, 480)).is_empty());
    }
}
