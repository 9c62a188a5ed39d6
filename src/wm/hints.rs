//! Hints Module
//!
//! Window hints parsing and normalization (WM_NORMAL_HINTS, WM_HINTS,
//! struts).

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::shared::Geometry;
use crate::wm::geometry::Gravity;

bitflags! {
    /// WM_SIZE_HINTS flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SizeHintFlags: u32 {
        const US_POSITION  = 1 << 0;
        const US_SIZE      = 1 << 1;
        const P_POSITION   = 1 << 2;
        const P_SIZE       = 1 << 3;
        const P_MIN_SIZE   = 1 << 4;
        const P_MAX_SIZE   = 1 << 5;
        const P_RESIZE_INC = 1 << 6;
        const P_ASPECT     = 1 << 7;
        const P_BASE_SIZE  = 1 << 8;
        const P_WIN_GRAVITY = 1 << 9;
    }
}

/// Largest size we let hints express; leaves headroom for arithmetic
pub const MAX_SIZE: i32 = i32::MAX / 4;

/// Normalized size hints
///
/// Every field holds a usable value whether or not the client set it.
/// `min_*` and `max_*` are congruent to `base_* mod *_inc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeHints {
    pub flags: SizeHintFlags,
    pub min_width: i32,
    pub min_height: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub width_inc: i32,
    pub height_inc: i32,
    pub base_width: i32,
    pub base_height: i32,
    /// `(numerator, denominator)`, only with `P_ASPECT`
    pub min_aspect: Option<(i32, i32)>,
    pub max_aspect: Option<(i32, i32)>,
    pub win_gravity: Gravity,
}

impl Default for SizeHints {
    fn default() -> Self {
        Self {
            flags: SizeHintFlags::empty(),
            min_width: 1,
            min_height: 1,
            max_width: MAX_SIZE,
            max_height: MAX_SIZE,
            width_inc: 1,
            height_inc: 1,
            base_width: 0,
            base_height: 0,
            min_aspect: None,
            max_aspect: None,
            win_gravity: Gravity::NorthWest,
        }
    }
}

/// Round `value` up to the next value congruent to `base mod inc`
fn round_up_to_increment(value: i32, base: i32, inc: i32) -> i32 {
    value + (base - value).rem_euclid(inc)
}

/// Round `value` down to the previous value congruent to `base mod inc`
fn round_down_to_increment(value: i32, base: i32, inc: i32) -> i32 {
    value - (value - base).rem_euclid(inc)
}

impl SizeHints {
    /// Parse a raw WM_SIZE_HINTS property (18 CARD32 values) and normalize it
    ///
    /// Short payloads are padded with zeros.
    pub fn from_raw(data: &[u32]) -> Self {
        if data.len() < 18 {
            debug!("Hints: WM_NORMAL_HINTS has {} values, padding", data.len());
        }
        let field = |i: usize| data.get(i).copied().unwrap_or(0) as i32;
        let flags = SizeHintFlags::from_bits_truncate(data.first().copied().unwrap_or(0));

        let mut hints = Self {
            flags,
            ..Self::default()
        };

        let (min_w, min_h) = (field(5), field(6));
        let (max_w, max_h) = (field(7), field(8));
        let (inc_w, inc_h) = (field(9), field(10));
        let (base_w, base_h) = (field(15), field(16));

        if flags.contains(SizeHintFlags::P_BASE_SIZE) {
            hints.base_width = base_w.max(0);
            hints.base_height = base_h.max(0);
        } else if flags.contains(SizeHintFlags::P_MIN_SIZE) {
            hints.base_width = min_w.max(0);
            hints.base_height = min_h.max(0);
        }

        if flags.contains(SizeHintFlags::P_MIN_SIZE) {
            hints.min_width = min_w;
            hints.min_height = min_h;
        } else if flags.contains(SizeHintFlags::P_BASE_SIZE) {
            hints.min_width = base_w;
            hints.min_height = base_h;
        }

        if flags.contains(SizeHintFlags::P_MAX_SIZE) {
            hints.max_width = if max_w > 0 { max_w.min(MAX_SIZE) } else { MAX_SIZE };
            hints.max_height = if max_h > 0 { max_h.min(MAX_SIZE) } else { MAX_SIZE };
        }

        if flags.contains(SizeHintFlags::P_RESIZE_INC) {
            hints.width_inc = inc_w;
            hints.height_inc = inc_h;
        }

        if flags.contains(SizeHintFlags::P_ASPECT) {
            let (min_num, min_den, max_num, max_den) = (field(11), field(12), field(13), field(14));
            if min_num > 0 && min_den > 0 {
                hints.min_aspect = Some((min_num, min_den));
            }
            if max_num > 0 && max_den > 0 {
                hints.max_aspect = Some((max_num, max_den));
            }
        }

        if flags.contains(SizeHintFlags::P_WIN_GRAVITY) {
            hints.win_gravity = Gravity::from_raw(field(17) as u32);
        }

        hints.normalize();
        hints
    }

    /// Clamp every field into a sane, mutually consistent range
    pub fn normalize(&mut self) {
        if self.width_inc < 1 {
            warn!("Hints: width_inc {} is invalid, using 1", self.width_inc);
            self.width_inc = 1;
        }
        if self.height_inc < 1 {
            warn!("Hints: height_inc {} is invalid, using 1", self.height_inc);
            self.height_inc = 1;
        }
        // Keeps the increment rounding below within i32
        self.width_inc = self.width_inc.min(MAX_SIZE);
        self.height_inc = self.height_inc.min(MAX_SIZE);
        self.base_width = self.base_width.clamp(0, MAX_SIZE);
        self.base_height = self.base_height.clamp(0, MAX_SIZE);

        self.min_width = self.min_width.clamp(1, MAX_SIZE);
        self.min_height = self.min_height.clamp(1, MAX_SIZE);
        self.max_width = self.max_width.clamp(1, MAX_SIZE);
        self.max_height = self.max_height.clamp(1, MAX_SIZE);

        if self.max_width < self.min_width {
            warn!("Hints: max_width {} < min_width {}", self.max_width, self.min_width);
            self.max_width = self.min_width;
        }
        if self.max_height < self.min_height {
            warn!("Hints: max_height {} < min_height {}", self.max_height, self.min_height);
            self.max_height = self.min_height;
        }

        self.min_width = round_up_to_increment(self.min_width, self.base_width, self.width_inc);
        self.min_height = round_up_to_increment(self.min_height, self.base_height, self.height_inc);
        self.max_width = round_down_to_increment(self.max_width, self.base_width, self.width_inc)
            .max(self.min_width);
        self.max_height = round_down_to_increment(self.max_height, self.base_height, self.height_inc)
            .max(self.min_height);

        if let (Some((min_n, min_d)), Some((max_n, max_d))) = (self.min_aspect, self.max_aspect) {
            // min_aspect > max_aspect cannot be satisfied
            if min_n as i64 * max_d as i64 > max_n as i64 * min_d as i64 {
                warn!("Hints: min_aspect {}/{} > max_aspect {}/{}, ignoring aspect", min_n, min_d, max_n, max_d);
                self.min_aspect = None;
                self.max_aspect = None;
            }
        }
    }

    pub fn is_resizable(&self) -> bool {
        self.min_width < self.max_width || self.min_height < self.max_height
    }

    /// Client gravity for geometry requests
    pub fn gravity(&self) -> Gravity {
        self.win_gravity
    }
}

/// WM_HINTS input model and urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WmHints {
    pub input: bool,
    pub urgent: bool,
    pub iconic: bool,
}

impl Default for WmHints {
    fn default() -> Self {
        Self {
            input: true,
            urgent: false,
            iconic: false,
        }
    }
}

impl WmHints {
    const INPUT_HINT: u32 = 1 << 0;
    const STATE_HINT: u32 = 1 << 1;
    const URGENCY_HINT: u32 = 1 << 8;
    const ICONIC_STATE: u32 = 3;

    pub fn from_raw(data: &[u32]) -> Self {
        let mut hints = Self::default();
        let Some(&flags) = data.first() else {
            return hints;
        };
        if flags & Self::INPUT_HINT != 0 {
            hints.input = data.get(1).copied().unwrap_or(1) != 0;
        }
        if flags & Self::STATE_HINT != 0 {
            hints.iconic = data.get(2).copied() == Some(Self::ICONIC_STATE);
        }
        hints.urgent = flags & Self::URGENCY_HINT != 0;
        hints
    }
}

/// Minimum space left between opposite struts
pub const MIN_EMPTY: i32 = 76;

/// Screen-edge space reserved by a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Struts {
    pub left: Option<Geometry>,
    pub right: Option<Geometry>,
    pub top: Option<Geometry>,
    pub bottom: Option<Geometry>,
}

impl Struts {
    /// Parse `_NET_WM_STRUT_PARTIAL` (12 values) or `_NET_WM_STRUT` (4 values)
    pub fn from_raw(data: &[u32], screen_width: i32, screen_height: i32) -> Option<Self> {
        let mut widths = match data.len() {
            4 | 12 => [data[0] as i32, data[1] as i32, data[2] as i32, data[3] as i32],
            n => {
                warn!("Hints: strut property has {} values, expected 4 or 12", n);
                return None;
            }
        };
        for w in &mut widths {
            *w = (*w).max(0);
        }

        // Leave room between opposite struts
        let gap = screen_width - widths[0] - widths[1] - MIN_EMPTY;
        if gap < 0 {
            widths[0] = (widths[0] + gap / 2).max(0);
            widths[1] = (widths[1] + (gap - gap / 2)).max(0);
        }
        let gap = screen_height - widths[2] - widths[3] - MIN_EMPTY;
        if gap < 0 {
            widths[2] = (widths[2] + gap / 2).max(0);
            widths[3] = (widths[3] + (gap - gap / 2)).max(0);
        }

        let span = |start: usize, full: i32| -> (i32, i32) {
            if data.len() == 12 {
                let s = data[start] as i32;
                let e = data[start + 1] as i32;
                (s, (e - s + 1).max(0))
            } else {
                (0, full)
            }
        };

        let mut struts = Self::default();
        if widths[0] > 0 {
            let (y, len) = span(4, screen_height);
            struts.left = Some(Geometry::new(0, y, widths[0], len));
        }
        if widths[1] > 0 {
            let (y, len) = span(6, screen_height);
            struts.right = Some(Geometry::new(screen_width - widths[1], y, widths[1], len));
        }
        if widths[2] > 0 {
            let (x, len) = span(8, screen_width);
            struts.top = Some(Geometry::new(x, 0, len, widths[2]));
        }
        if widths[3] > 0 {
            let (x, len) = span(10, screen_width);
            struts.bottom = Some(Geometry::new(x, screen_height - widths[3], len, widths[3]));
        }
        Some(struts)
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none() && self.top.is_none() && self.bottom.is_none()
    }
}
