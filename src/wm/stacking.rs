//! Stacking Module
//!
//! Manages window z-order and layers. The manager itself is a plain
//! container; `Display` pushes its order to the server.

use anyhow::Result;
use tracing::debug;
use x11rb::protocol::xproto::{ConfigureWindowAux, StackMode, Window};

use crate::wm::client::Client;
use crate::wm::client_flags::{ClientFlags, WindowLayer, WindowType};
use crate::wm::conn::XConn;
use crate::wm::display::Display;

/// Saved stacking order, bottom to top
pub type StackSnapshot = Vec<Window>;

/// Stacking manager
#[derive(Debug, Default)]
pub struct StackingManager {
    /// Stacking order (bottom to top), kept sorted by layer
    entries: Vec<(Window, WindowLayer)>,

    /// Order last pushed to the server
    synced: Vec<Window>,

    freeze_count: u32,
}

impl StackingManager {
    /// Create a new stacking manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Index just above the last window at or below `layer`
    fn layer_top(&self, layer: WindowLayer) -> usize {
        self.entries.iter().take_while(|(_, l)| *l <= layer).count()
    }

    fn layer_bottom(&self, layer: WindowLayer) -> usize {
        self.entries.iter().take_while(|(_, l)| *l < layer).count()
    }

    fn position(&self, window: Window) -> Option<usize> {
        self.entries.iter().position(|(w, _)| *w == window)
    }

    /// Add a window on top of its layer
    pub fn add(&mut self, window: Window, layer: WindowLayer) {
        self.remove(window);
        let index = self.layer_top(layer);
        self.entries.insert(index, (window, layer));
    }

    pub fn remove(&mut self, window: Window) -> bool {
        match self.position(window) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn layer_of(&self, window: Window) -> Option<WindowLayer> {
        self.position(window).map(|i| self.entries[i].1)
    }

    /// Move a window to a new layer, on top of it; no-op if unchanged
    pub fn set_layer(&mut self, window: Window, layer: WindowLayer) -> bool {
        match self.layer_of(window) {
            Some(current) if current != layer => {
                self.add(window, layer);
                true
            }
            _ => false,
        }
    }

    /// Put a window on top of its layer
    pub fn raise(&mut self, window: Window) -> bool {
        let Some(layer) = self.layer_of(window) else {
            return false;
        };
        self.remove(window);
        let index = self.layer_top(layer);
        self.entries.insert(index, (window, layer));
        true
    }

    /// Put a window at the bottom of its layer
    pub fn lower(&mut self, window: Window) -> bool {
        let Some(layer) = self.layer_of(window) else {
            return false;
        };
        self.remove(window);
        let index = self.layer_bottom(layer);
        self.entries.insert(index, (window, layer));
        true
    }

    /// Topmost window
    pub fn top(&self) -> Option<Window> {
        self.entries.last().map(|(w, _)| *w)
    }

    /// Bottom to top
    pub fn order(&self) -> Vec<Window> {
        self.entries.iter().map(|(w, _)| *w).collect()
    }

    pub fn freeze(&mut self) {
        self.freeze_count += 1;
    }

    /// Returns true when the last freeze is released
    pub fn thaw(&mut self) -> bool {
        if self.freeze_count == 0 {
            return false;
        }
        self.freeze_count -= 1;
        self.freeze_count == 0
    }

    pub fn is_frozen(&self) -> bool {
        self.freeze_count > 0
    }

    pub fn snapshot(&self) -> StackSnapshot {
        self.order()
    }

    /// Go back to a saved order; windows added since keep their place on top
    pub fn restore(&mut self, snapshot: &StackSnapshot) {
        let rank = |w: Window| snapshot.iter().position(|s| *s == w).unwrap_or(usize::MAX);
        self.entries.sort_by_key(|(w, layer)| (*layer, rank(*w)));
    }

    /// Windows whose server stacking must change, with the window to sit on
    ///
    /// Everything from the first difference with the last synced order is
    /// restacked bottom-up.
    fn pending_restack(&mut self) -> Vec<(Window, Option<Window>)> {
        let order = self.order();
        let first_diff = order
            .iter()
            .zip(self.synced.iter())
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| order.len().min(self.synced.len()));
        let changes = (first_diff..order.len())
            .map(|i| (order[i], i.checked_sub(1).map(|p| order[p])))
            .collect();
        self.synced = order;
        changes
    }
}

impl<C: XConn> Display<C> {
    /// Layer a client belongs in given its type and state
    pub fn layer_for(&self, client: &Client) -> WindowLayer {
        if client.window_type == WindowType::Desktop {
            WindowLayer::Desktop
        } else if client.window_type == WindowType::Dock && !client.state.contains(ClientFlags::BELOW) {
            WindowLayer::Dock
        } else if client.is_fullscreen() && self.focus.focus_window == Some(client.window) {
            WindowLayer::Fullscreen
        } else if client.state.contains(ClientFlags::ABOVE) {
            WindowLayer::Above
        } else if client.state.contains(ClientFlags::BELOW) {
            WindowLayer::Below
        } else {
            WindowLayer::Normal
        }
    }

    /// Recompute a client's layer and restack if it moved
    pub fn update_layer(&mut self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let layer = self.layer_for(client);
        if self.stack.set_layer(window, layer) {
            debug!("Stack: 0x{:x} moves to layer {:?}", window, layer);
            self.sync_stack()?;
        }
        Ok(())
    }

    pub fn raise_window(&mut self, window: Window) -> Result<()> {
        if self.stack.raise(window) {
            debug!("Stack: raising 0x{:x}", window);
            self.sync_stack()?;
        }
        Ok(())
    }

    pub fn lower_window(&mut self, window: Window) -> Result<()> {
        if self.stack.lower(window) {
            debug!("Stack: lowering 0x{:x}", window);
            self.sync_stack()?;
        }
        Ok(())
    }

    pub fn stack_freeze(&mut self) {
        self.stack.freeze();
    }

    pub fn stack_thaw(&mut self) -> Result<()> {
        if self.stack.thaw() {
            self.sync_stack()?;
        }
        Ok(())
    }

    /// Push the stacking order to the server unless frozen
    pub fn sync_stack(&mut self) -> Result<()> {
        if self.stack.is_frozen() {
            return Ok(());
        }
        let changes = self.stack.pending_restack();
        if changes.is_empty() {
            return Ok(());
        }
        let xwindow = |w: Window| self.clients.get(&w).map(|c| c.outer_xwindow()).unwrap_or(w);
        for (window, below) in changes {
            let aux = match below {
                Some(sibling) => ConfigureWindowAux::new()
                    .sibling(xwindow(sibling))
                    .stack_mode(StackMode::ABOVE),
                None => ConfigureWindowAux::new().stack_mode(StackMode::BELOW),
            };
            self.conn.configure_window(xwindow(window), &aux)?;
        }
        self.atoms
            .update_client_list(&self.conn, self.screen.root, true, &self.stack.order())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_keep_order() {
        let mut stack = StackingManager::new();
        stack.add(1, WindowLayer::Normal);
        stack.add(2, WindowLayer::Dock);
        stack.add(3, WindowLayer::Normal);
        stack.add(4, WindowLayer::Desktop);
        assert_eq!(stack.order(), vec![4, 1, 3, 2]);
        assert_eq!(stack.top(), Some(2));
    }

    #[test]
    fn test_raise_and_lower_stay_in_layer() {
        let mut stack = StackingManager::new();
        stack.add(1, WindowLayer::Normal);
        stack.add(2, WindowLayer::Normal);
        stack.add(9, WindowLayer::Above);
        assert!(stack.raise(1));
        assert_eq!(stack.order(), vec![2, 1, 9]);
        assert!(stack.lower(1));
        assert_eq!(stack.order(), vec![1, 2, 9]);
        assert!(!stack.raise(42));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut stack = StackingManager::new();
        stack.add(1, WindowLayer::Normal);
        stack.add(2, WindowLayer::Normal);
        stack.add(3, WindowLayer::Normal);
        let snapshot = stack.snapshot();
        stack.raise(1);
        stack.add(4, WindowLayer::Normal);
        stack.restore(&snapshot);
        assert_eq!(stack.order(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_freeze_thaw_counts() {
        let mut stack = StackingManager::new();
        stack.freeze();
        stack.freeze();
        assert!(!stack.thaw());
        assert!(stack.is_frozen());
        assert!(stack.thaw());
        assert!(!stack.thaw());
    }

    #[test]
    fn test_pending_restack_only_touches_changed_tail() {
        let mut stack = StackingManager::new();
        stack.add(1, WindowLayer::Normal);
        stack.add(2, WindowLayer::Normal);
        stack.add(3, WindowLayer::Normal);
        assert_eq!(stack.pending_restack().len(), 3);
        stack.raise(2);
        assert_eq!(stack.pending_restack(), vec![(3, Some(1)), (2, Some(3))]);
        assert!(stack.pending_restack().is_empty());
    }
}
