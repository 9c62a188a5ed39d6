//! Window geometry primitives
//!
//! Rectangles are kept in signed integers so that intermediate results of
//! gravity and delta arithmetic can go negative without wrapping.

/// Window geometry (root coordinates unless stated otherwise)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Overlapping part of two rectangles, if any
    pub fn intersection(&self, other: &Geometry) -> Option<Geometry> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right > x && bottom > y {
            Some(Geometry::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn same_size(&self, other: &Geometry) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn same_position(&self, other: &Geometry) -> bool {
        self.x == other.x && self.y == other.y
    }
}

/// Frame decoration extents around a client window
///
/// `left`/`top` are also the client's position inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameBorders {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl FrameBorders {
    pub fn new(left: i32, right: i32, top: i32, bottom: i32) -> Self {
        Self { left, right, top, bottom }
    }

    /// Frame rectangle around a client rectangle
    pub fn frame_rect(&self, client: &Geometry, shaded: bool) -> Geometry {
        let height = if shaded {
            self.top
        } else {
            client.height + self.top + self.bottom
        };
        Geometry::new(
            client.x - self.left,
            client.y - self.top,
            client.width + self.left + self.right,
            height,
        )
    }

    /// Values in `_NET_FRAME_EXTENTS` order
    pub fn as_extents(&self) -> [u32; 4] {
        [
            self.left.max(0) as u32,
            self.right.max(0) as u32,
            self.top.max(0) as u32,
            self.bottom.max(0) as u32,
        ]
    }
}
