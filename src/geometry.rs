//! Canvas-space geometry primitives.
//!
//! [`Rect`] is the mutable placement rectangle owned by each layer; animation
//! and occlusion tracking rewrite its position per frame. [`Roi`] describes
//! where a layer's transformed frame actually lands on the canvas after
//! clipping, in both canvas and frame coordinates.

/// Axis-aligned rectangle in canvas pixel space.
///
/// `x`/`y` may be negative (a layer can hang off the canvas); `width` and
/// `height` are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Clip this rectangle against a canvas of the given size.
    ///
    /// Returns `None` when the intersection is empty; otherwise the ROI
    /// carrying both the visible canvas region and the matching sub-region
    /// of the layer frame.
    pub fn clip_to_canvas(&self, canvas_width: u32, canvas_height: u32) -> Option<Roi> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = (self.x + self.width as i64).min(canvas_width as i64);
        let y2 = (self.y + self.height as i64).min(canvas_height as i64);

        if x1 >= x2 || y1 >= y2 {
            return None;
        }

        let fx1 = (x1 - self.x) as u32;
        let fy1 = (y1 - self.y) as u32;

        Some(Roi {
            x1: x1 as u32,
            y1: y1 as u32,
            x2: x2 as u32,
            y2: y2 as u32,
            fx1,
            fy1,
            fx2: fx1 + (x2 - x1) as u32,
            fy2: fy1 + (y2 - y1) as u32,
        })
    }
}

/// Region of interest produced by clipping a layer rectangle to the canvas.
///
/// `x1..x2 × y1..y2` is the visible region in canvas coordinates;
/// `fx1..fx2 × fy1..fy2` is the matching region in the layer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub fx1: u32,
    pub fy1: u32,
    pub fx2: u32,
    pub fy2: u32,
}

impl Roi {
    /// Width of the visible region.
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    /// Height of the visible region.
    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_visible_rect() {
        let rect = Rect::new(10, 20, 100, 50);
        let roi = rect.clip_to_canvas(1280, 720).unwrap();

        assert_eq!((roi.x1, roi.y1, roi.x2, roi.y2), (10, 20, 110, 70));
        assert_eq!((roi.fx1, roi.fy1, roi.fx2, roi.fy2), (0, 0, 100, 50));
        assert_eq!(roi.width(), 100);
        assert_eq!(roi.height(), 50);
    }

    #[test]
    fn test_rect_hanging_off_top_left() {
        let rect = Rect::new(-30, -10, 100, 50);
        let roi = rect.clip_to_canvas(1280, 720).unwrap();

        assert_eq!((roi.x1, roi.y1), (0, 0));
        assert_eq!((roi.x2, roi.y2), (70, 40));
        // The frame sub-region starts where the rect left the canvas
        assert_eq!((roi.fx1, roi.fy1), (30, 10));
        assert_eq!((roi.fx2, roi.fy2), (100, 50));
    }

    #[test]
    fn test_rect_clipped_at_bottom_right() {
        let rect = Rect::new(1200, 700, 100, 50);
        let roi = rect.clip_to_canvas(1280, 720).unwrap();

        assert_eq!((roi.x1, roi.y1, roi.x2, roi.y2), (1200, 700, 1280, 720));
        assert_eq!((roi.fx1, roi.fy1, roi.fx2, roi.fy2), (0, 0, 80, 20));
    }

    #[test]
    fn test_rect_entirely_off_canvas() {
        assert!(Rect::new(2000, 0, 100, 50).clip_to_canvas(1280, 720).is_none());
        assert!(Rect::new(-200, 0, 100, 50).clip_to_canvas(1280, 720).is_none());
        assert!(Rect::new(0, 720, 100, 50).clip_to_canvas(1280, 720).is_none());
    }
}
