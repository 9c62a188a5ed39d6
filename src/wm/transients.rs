//! Transients Module
//!
//! Walks WM_TRANSIENT_FOR chains. Clients may declare cycles, so every walk
//! is a bounded tortoise-and-hare over the client map.

use std::collections::HashMap;

use tracing::warn;
use x11rb::protocol::xproto::Window;

use crate::wm::client::Client;
use crate::wm::client_flags::{ClientFlags, WindowType};

fn parent_of(clients: &HashMap<Window, Client>, window: Window) -> Option<Window> {
    clients
        .get(&window)
        .and_then(|c| c.transient_for)
        .filter(|parent| clients.contains_key(parent))
}

/// Visit `window`'s ancestors nearest first; stops at the first repeat
///
/// The callback returns `false` to stop early.
pub fn foreach_ancestor<F>(clients: &HashMap<Window, Client>, window: Window, mut f: F)
where
    F: FnMut(&Client) -> bool,
{
    let mut tortoise = window;
    let mut hare = window;
    loop {
        let Some(next) = parent_of(clients, hare) else {
            return;
        };
        hare = next;
        if let Some(client) = clients.get(&hare) {
            if !f(client) {
                return;
            }
        }

        let Some(next) = parent_of(clients, hare) else {
            return;
        };
        hare = next;
        if let Some(client) = clients.get(&hare) {
            if !f(client) {
                return;
            }
        }

        // Both pointers start together; only the hare moving twice catches a loop
        tortoise = parent_of(clients, tortoise).unwrap_or(tortoise);
        if tortoise == hare {
            warn!("Transients: WM_TRANSIENT_FOR loop through 0x{:x}", hare);
            return;
        }
    }
}

/// Whether `ancestor` appears in `window`'s transient chain
pub fn is_ancestor_of(clients: &HashMap<Window, Client>, ancestor: Window, window: Window) -> bool {
    let mut found = false;
    foreach_ancestor(clients, window, |c| {
        found = c.window == ancestor;
        !found
    });
    found
}

/// A modal dialog that moves together with its parent
pub fn is_attached_dialog(client: &Client, attach_modal_dialogs: bool) -> bool {
    attach_modal_dialogs
        && client.transient_for.is_some()
        && (client.window_type == WindowType::ModalDialog || client.state.contains(ClientFlags::MODAL))
}

/// First window in the chain starting at `window` that is not an attached dialog
pub fn grab_target(clients: &HashMap<Window, Client>, window: Window, attach_modal_dialogs: bool) -> Window {
    match clients.get(&window) {
        Some(client) if is_attached_dialog(client, attach_modal_dialogs) => {}
        _ => return window,
    }
    let mut target = window;
    foreach_ancestor(clients, window, |c| {
        target = c.window;
        is_attached_dialog(c, attach_modal_dialogs)
    });
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Geometry;

    fn clients(links: &[(Window, Option<Window>)]) -> HashMap<Window, Client> {
        links
            .iter()
            .map(|&(w, parent)| {
                let mut client = Client::new(w, Geometry::new(0, 0, 10, 10), 0);
                client.transient_for = parent;
                (w, client)
            })
            .collect()
    }

    #[test]
    fn test_walk_visits_chain_in_order() {
        let map = clients(&[(1, Some(2)), (2, Some(3)), (3, None)]);
        let mut seen = Vec::new();
        foreach_ancestor(&map, 1, |c| {
            seen.push(c.window);
            true
        });
        assert_eq!(seen, vec![2, 3]);
        assert!(is_ancestor_of(&map, 3, 1));
        assert!(!is_ancestor_of(&map, 1, 3));
    }

    #[test]
    fn test_walk_terminates_on_cycle() {
        let map = clients(&[(1, Some(2)), (2, Some(3)), (3, Some(1))]);
        let mut visits = 0;
        foreach_ancestor(&map, 1, |_| {
            visits += 1;
            true
        });
        assert!(visits <= 6);
        assert!(!is_ancestor_of(&map, 4, 1));
    }

    #[test]
    fn test_self_loop_terminates() {
        let map = clients(&[(1, Some(1))]);
        assert!(!is_ancestor_of(&map, 2, 1));
    }

    #[test]
    fn test_grab_target_skips_attached_modals() {
        let mut map = clients(&[(1, Some(2)), (2, Some(3)), (3, None)]);
        map.get_mut(&1).unwrap().window_type = WindowType::ModalDialog;
        map.get_mut(&2).unwrap().state.insert(ClientFlags::MODAL);
        assert_eq!(grab_target(&map, 1, true), 3);
        assert_eq!(grab_target(&map, 1, false), 1);
        assert_eq!(grab_target(&map, 3, true), 3);
    }
}
