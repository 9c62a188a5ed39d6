//! Screen Module
//!
//! Per-screen state: root window, helper windows, monitors, work area.

use tracing::debug;
use x11rb::protocol::xproto::Window;

use crate::shared::Geometry;
use crate::wm::hints::Struts;

/// Monitor/Output device information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub rect: Geometry,
    pub primary: bool,
}

/// ScreenInfo - the single managed screen
#[derive(Debug, Clone)]
pub struct ScreenInfo {
    /// Root window
    pub root: Window,

    /// Screen width (all outputs combined)
    pub width: i32,

    /// Screen height (all outputs combined)
    pub height: i32,

    /// Input-only window that holds focus when no client should
    pub no_focus_window: Window,

    /// Window used for timestamp round trips, focus markers, the
    /// _NET_SUPPORTING_WM_CHECK and the WM_Sn selection
    pub timestamp_window: Window,

    /// Monitors/outputs
    pub monitors: Vec<Monitor>,

    /// Work area (screen minus struts/panels)
    pub work_area: Geometry,
}

impl ScreenInfo {
    pub fn new(
        root: Window,
        width: i32,
        height: i32,
        no_focus_window: Window,
        timestamp_window: Window,
        mut monitors: Vec<Monitor>,
    ) -> Self {
        if monitors.is_empty() {
            monitors.push(Monitor {
                rect: Geometry::new(0, 0, width, height),
                primary: true,
            });
        }
        Self {
            root,
            width,
            height,
            no_focus_window,
            timestamp_window,
            monitors,
            work_area: Geometry::new(0, 0, width, height),
        }
    }

    pub fn rect(&self) -> Geometry {
        Geometry::new(0, 0, self.width, self.height)
    }

    pub fn monitor_rects(&self) -> Vec<Geometry> {
        self.monitors.iter().map(|m| m.rect).collect()
    }

    /// Recompute the work area from every window's struts
    ///
    /// Returns whether the work area changed.
    pub fn update_work_area<'a>(&mut self, struts: impl Iterator<Item = &'a Struts>) -> bool {
        let (mut left, mut right, mut top, mut bottom) = (0, 0, 0, 0);
        for s in struts {
            if let Some(r) = s.left {
                left = left.max(r.right());
            }
            if let Some(r) = s.right {
                right = right.max(self.width - r.x);
            }
            if let Some(r) = s.top {
                top = top.max(r.bottom());
            }
            if let Some(r) = s.bottom {
                bottom = bottom.max(self.height - r.y);
            }
        }

        let work_area = Geometry::new(
            left,
            top,
            (self.width - left - right).max(1),
            (self.height - top - bottom).max(1),
        );
        let changed = work_area != self.work_area;
        if changed {
            debug!(
                "Updated work area: {}x{} at ({}, {})",
                work_area.width, work_area.height, work_area.x, work_area.y
            );
            self.work_area = work_area;
        }
        changed
    }

    /// Find monitor at point
    pub fn find_monitor_at_point(&self, x: i32, y: i32) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.rect.contains_point(x, y))
    }

    /// Get primary monitor
    pub fn primary_monitor(&self) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.primary).or_else(|| self.monitors.first())
    }

    /// Work area of the monitor containing the point
    pub fn work_area_at(&self, x: i32, y: i32) -> Geometry {
        let monitor = self
            .find_monitor_at_point(x, y)
            .or_else(|| self.primary_monitor())
            .map(|m| m.rect)
            .unwrap_or_else(|| self.rect());
        monitor.intersection(&self.work_area).unwrap_or(monitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struts_reduce_work_area() {
        let mut screen = ScreenInfo::new(1, 1920, 1080, 2, 3, Vec::new());
        let panel = Struts::from_raw(&[0, 0, 30, 0], 1920, 1080).unwrap();
        let dock = Struts::from_raw(&[48, 0, 0, 0], 1920, 1080).unwrap();
        assert!(screen.update_work_area([panel, dock].iter()));
        assert_eq!(screen.work_area, Geometry::new(48, 30, 1872, 1050));
        assert!(!screen.update_work_area([panel, dock].iter()));
    }

    #[test]
    fn test_work_area_at_clips_to_monitor() {
        let monitors = vec![
            Monitor { rect: Geometry::new(0, 0, 1920, 1080), primary: true },
            Monitor { rect: Geometry::new(1920, 0, 1280, 1024), primary: false },
        ];
        let mut screen = ScreenInfo::new(1, 3200, 1080, 2, 3, monitors);
        let panel = Struts::from_raw(&[0, 0, 30, 0], 3200, 1080).unwrap();
        screen.update_work_area(std::iter::once(&panel));
        assert_eq!(screen.work_area_at(2000, 500), Geometry::new(1920, 30, 1280, 994));
    }
}
