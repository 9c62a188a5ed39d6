//! Window geometry pipeline: pure parts
//!
//! Gravity translation between requested anchor points and client
//! positions, resize deltas, and the decision of which configure requests
//! a geometry change needs. The stateful half lives in `configure.rs`.

use bitflags::bitflags;
use x11rb::protocol::xproto::ConfigureWindowAux;

use crate::shared::{FrameBorders, Geometry};

/// ICCCM window gravity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Gravity {
    #[default]
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
    Static,
}

impl Gravity {
    pub const ALL: [Gravity; 10] = [
        Gravity::NorthWest,
        Gravity::North,
        Gravity::NorthEast,
        Gravity::West,
        Gravity::Center,
        Gravity::East,
        Gravity::SouthWest,
        Gravity::South,
        Gravity::SouthEast,
        Gravity::Static,
    ];

    /// From the wire value; `ForgetGravity` and garbage become NorthWest
    pub fn from_raw(value: u32) -> Self {
        match value {
            2 => Gravity::North,
            3 => Gravity::NorthEast,
            4 => Gravity::West,
            5 => Gravity::Center,
            6 => Gravity::East,
            7 => Gravity::SouthWest,
            8 => Gravity::South,
            9 => Gravity::SouthEast,
            10 => Gravity::Static,
            _ => Gravity::NorthWest,
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Gravity::NorthWest => 1,
            Gravity::North => 2,
            Gravity::NorthEast => 3,
            Gravity::West => 4,
            Gravity::Center => 5,
            Gravity::East => 6,
            Gravity::SouthWest => 7,
            Gravity::South => 8,
            Gravity::SouthEast => 9,
            Gravity::Static => 10,
        }
    }

    /// Which horizontal edge moves when a window with this gravity resizes
    pub fn x_direction(self) -> ResizeDirection {
        match self {
            Gravity::NorthEast | Gravity::East | Gravity::SouthEast => ResizeDirection::LeftOrTop,
            Gravity::North | Gravity::Center | Gravity::South => ResizeDirection::Center,
            Gravity::NorthWest | Gravity::West | Gravity::SouthWest | Gravity::Static => {
                ResizeDirection::RightOrBottom
            }
        }
    }

    /// Which vertical edge moves when a window with this gravity resizes
    pub fn y_direction(self) -> ResizeDirection {
        match self {
            Gravity::SouthWest | Gravity::South | Gravity::SouthEast => ResizeDirection::LeftOrTop,
            Gravity::West | Gravity::Center | Gravity::East => ResizeDirection::Center,
            Gravity::NorthWest | Gravity::North | Gravity::NorthEast | Gravity::Static => {
                ResizeDirection::RightOrBottom
            }
        }
    }
}

/// Edge that moves during a resize along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeDirection {
    LeftOrTop,
    Center,
    RightOrBottom,
}

bitflags! {
    /// How a geometry change was initiated
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MoveResizeFlags: u32 {
        const IS_CONFIGURE_REQUEST = 1 << 0;
        const DO_GRAVITY_ADJUST    = 1 << 1;
        const IS_USER_ACTION       = 1 << 2;
        const IS_MOVE_ACTION       = 1 << 3;
        const IS_RESIZE_ACTION     = 1 << 4;
    }
}

/// Turn a requested reference point into the client's north-west corner
///
/// `(x, y)` is where the client asked its gravity reference point to be,
/// `(width, height)` the client size. The window border is only counted when
/// `coords_assume_border` is set, which is the case for configure requests.
#[allow(clippy::too_many_arguments)]
pub fn adjust_for_gravity(
    gravity: Gravity,
    borders: Option<&FrameBorders>,
    coords_assume_border: bool,
    border_width: i32,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
) -> (i32, i32) {
    let (child_x, child_y, frame_w, frame_h) = match borders {
        Some(b) => (b.left, b.top, b.left + width + b.right, b.top + height + b.bottom),
        None => (0, 0, width, height),
    };
    let bw = if coords_assume_border { border_width } else { 0 };

    let ref_x = match gravity.x_direction() {
        _ if gravity == Gravity::Static => x,
        ResizeDirection::RightOrBottom => x,
        ResizeDirection::Center => x + width / 2 + bw,
        ResizeDirection::LeftOrTop => x + width + bw * 2,
    };
    let ref_y = match gravity.y_direction() {
        _ if gravity == Gravity::Static => y,
        ResizeDirection::RightOrBottom => y,
        ResizeDirection::Center => y + height / 2 + bw,
        ResizeDirection::LeftOrTop => y + height + bw * 2,
    };

    if gravity == Gravity::Static {
        return (ref_x, ref_y);
    }

    let new_x = match gravity.x_direction() {
        ResizeDirection::RightOrBottom => ref_x + child_x,
        ResizeDirection::Center => ref_x - frame_w / 2 + child_x,
        ResizeDirection::LeftOrTop => ref_x - frame_w + child_x,
    };
    let new_y = match gravity.y_direction() {
        ResizeDirection::RightOrBottom => ref_y + child_y,
        ResizeDirection::Center => ref_y - frame_h / 2 + child_y,
        ResizeDirection::LeftOrTop => ref_y - frame_h + child_y,
    };
    (new_x, new_y)
}

/// The reference point a client with `gravity` would use to describe
/// its current position
///
/// This is the inverse of [`adjust_for_gravity`] without border width.
pub fn gravity_position(
    gravity: Gravity,
    client: &Geometry,
    borders: Option<&FrameBorders>,
    shaded: bool,
) -> (i32, i32) {
    let outer = match borders {
        Some(b) if gravity != Gravity::Static => b.frame_rect(client, shaded),
        _ => *client,
    };

    let x = match gravity.x_direction() {
        _ if gravity == Gravity::Static => outer.x,
        ResizeDirection::RightOrBottom => outer.x,
        ResizeDirection::Center => outer.x + outer.width / 2 - client.width / 2,
        ResizeDirection::LeftOrTop => outer.x + outer.width - client.width,
    };
    let y = match gravity.y_direction() {
        _ if gravity == Gravity::Static => outer.y,
        ResizeDirection::RightOrBottom => outer.y,
        ResizeDirection::Center => outer.y + outer.height / 2 - client.height / 2,
        ResizeDirection::LeftOrTop => outer.y + outer.height - client.height,
    };
    (x, y)
}

/// Per-axis change of the moving edge when resizing from `old` to the new size
pub fn mouse_deltas_for_resize(gravity: Gravity, old: &Geometry, width: i32, height: i32) -> (i32, i32) {
    let delta = |direction: ResizeDirection, old: i32, new: i32| match direction {
        ResizeDirection::LeftOrTop => old - new,
        ResizeDirection::RightOrBottom => new - old,
        ResizeDirection::Center => (new - old) / 2,
    };
    (
        delta(gravity.x_direction(), old.width, width),
        delta(gravity.y_direction(), old.height, height),
    )
}

/// Resize `rect` to the given size keeping the gravity anchor in place
pub fn resize_with_gravity(rect: &Geometry, width: i32, height: i32, gravity: Gravity) -> Geometry {
    let x = match gravity.x_direction() {
        ResizeDirection::RightOrBottom => rect.x,
        ResizeDirection::Center => rect.x + (rect.width - width) / 2,
        ResizeDirection::LeftOrTop => rect.x + rect.width - width,
    };
    let y = match gravity.y_direction() {
        ResizeDirection::RightOrBottom => rect.y,
        ResizeDirection::Center => rect.y + (rect.height - height) / 2,
        ResizeDirection::LeftOrTop => rect.y + rect.height - height,
    };
    Geometry::new(x, y, width, height)
}

/// Inputs for [`plan_configure`]
#[derive(Debug, Clone, Copy)]
pub struct PlanInput {
    pub flags: MoveResizeFlags,
    /// Client rectangle before the change, root coordinates
    pub old_rect: Geometry,
    /// Constrained client rectangle, root coordinates
    pub new_rect: Geometry,
    /// Current frame rectangle, if the window is framed
    pub old_frame_rect: Option<Geometry>,
    /// Client offsets inside the frame as last configured
    pub old_borders: Option<FrameBorders>,
    /// Borders to apply now
    pub new_borders: Option<FrameBorders>,
    pub shaded: bool,
    /// Border width the client requested
    pub border_width: i32,
    pub static_gravity_works: bool,
}

/// Which configure requests to issue and in what order
#[derive(Debug, Clone, Default)]
pub struct ConfigurePlan {
    pub client_changes: Option<ConfigureWindowAux>,
    pub frame_changes: Option<ConfigureWindowAux>,
    pub new_frame_rect: Option<Geometry>,
    pub configure_frame_first: bool,
    pub use_static_gravity: bool,
    pub need_resize_client: bool,
    pub need_move_client: bool,
    pub need_resize_frame: bool,
    pub need_move_frame: bool,
    pub need_configure_notify: bool,
    pub extents_changed: bool,
}

/// Decide the protocol requests for moving a window from `old_rect` to `new_rect`
pub fn plan_configure(input: &PlanInput) -> ConfigurePlan {
    let is_configure_request = input.flags.contains(MoveResizeFlags::IS_CONFIGURE_REQUEST);
    let old = input.old_rect;
    let new = input.new_rect;
    let mut plan = ConfigurePlan::default();

    plan.need_resize_client = !old.same_size(&new);

    let client_move;
    match (input.new_borders, input.old_frame_rect) {
        (Some(borders), Some(frame)) => {
            let new_frame = borders.frame_rect(&new, input.shaded);
            plan.need_resize_frame = !new_frame.same_size(&frame);
            plan.need_move_frame = !new_frame.same_position(&frame);
            plan.use_static_gravity =
                plan.need_move_frame && plan.need_resize_frame && input.static_gravity_works;

            if plan.use_static_gravity {
                let frame_dx = new_frame.x - frame.x;
                let frame_dy = new_frame.y - frame.y;
                client_move = (borders.left + frame_dx, borders.top + frame_dy);
                plan.need_move_client = true;
            } else {
                client_move = (borders.left, borders.top);
                let old_offset = input.old_borders.map(|b| (b.left, b.top)).unwrap_or((0, 0));
                plan.need_move_client = client_move != old_offset;
            }
            plan.extents_changed = input.old_borders != Some(borders);
            plan.new_frame_rect = Some(new_frame);
        }
        _ => {
            client_move = (new.x, new.y);
            plan.need_move_client = !old.same_position(&new);
            plan.extents_changed = input.old_borders.is_some();
        }
    }

    let moved = plan.need_move_client || plan.need_move_frame;
    let resized = plan.need_resize_client || plan.need_resize_frame;

    // A configure request that changes nothing still needs an answer
    if is_configure_request && !moved && !resized && input.border_width == 0 {
        plan.need_configure_notify = true;
    }
    // Moving without resizing generates no real ConfigureNotify for the client
    if moved && !resized {
        plan.need_configure_notify = true;
    }

    let size_dx = new.width - old.width;
    let size_dy = new.height - old.height;
    plan.configure_frame_first = size_dx + size_dy >= 0;

    if plan.need_move_frame || plan.need_resize_frame {
        if let Some(frame) = plan.new_frame_rect {
            let mut changes = ConfigureWindowAux::new();
            if plan.need_move_frame {
                changes = changes.x(frame.x).y(frame.y);
            }
            if plan.need_resize_frame {
                changes = changes
                    .width(frame.width.max(1) as u32)
                    .height(frame.height.max(1) as u32);
            }
            plan.frame_changes = Some(changes);
        }
    }

    let reset_border = is_configure_request && input.border_width != 0;
    if plan.need_move_client || plan.need_resize_client || reset_border {
        let mut changes = ConfigureWindowAux::new();
        if plan.need_move_client {
            changes = changes.x(client_move.0).y(client_move.1);
        }
        if plan.need_resize_client {
            changes = changes
                .width(new.width.max(1) as u32)
                .height(new.height.max(1) as u32);
        }
        if reset_border {
            changes = changes.border_width(0);
        }
        plan.client_changes = Some(changes);
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gravity_strategy() -> impl Strategy<Value = Gravity> {
        (0usize..10).prop_map(|i| Gravity::ALL[i])
    }

    proptest! {
        #[test]
        fn test_gravity_round_trip(
            gravity in gravity_strategy(),
            x in -2000i32..4000,
            y in -2000i32..4000,
            width in 1i32..3000,
            height in 1i32..3000,
            framed in any::<bool>(),
            left in 0i32..20,
            right in 0i32..20,
            top in 0i32..40,
            bottom in 0i32..20,
        ) {
            let client = Geometry::new(x, y, width, height);
            let borders = FrameBorders::new(left, right, top, bottom);
            let borders = framed.then_some(&borders);
            let (ref_x, ref_y) = gravity_position(gravity, &client, borders, false);
            let back = adjust_for_gravity(gravity, borders, false, 0, ref_x, ref_y, width, height);
            prop_assert_eq!(back, (x, y));
        }
    }

    #[test]
    fn test_adjust_for_gravity_with_border_width() {
        let (x, y) = adjust_for_gravity(Gravity::SouthEast, None, true, 2, 300, 200, 100, 50);
        // ref = (300 + 100 + 4, 200 + 50 + 4)
        assert_eq!((x, y), (304, 204));
    }

    #[test]
    fn test_adjust_for_gravity_static_passes_through() {
        let borders = FrameBorders::new(3, 3, 20, 3);
        let (x, y) = adjust_for_gravity(Gravity::Static, Some(&borders), true, 1, 50, 60, 100, 100);
        assert_eq!((x, y), (50, 60));
    }

    #[test]
    fn test_north_west_places_frame() {
        let borders = FrameBorders::new(3, 3, 20, 3);
        let (x, y) = adjust_for_gravity(Gravity::NorthWest, Some(&borders), false, 0, 0, 0, 100, 100);
        assert_eq!((x, y), (3, 20));
    }

    #[test]
    fn test_mouse_deltas() {
        let old = Geometry::new(0, 0, 100, 100);
        assert_eq!(mouse_deltas_for_resize(Gravity::NorthWest, &old, 140, 90), (40, -10));
        assert_eq!(mouse_deltas_for_resize(Gravity::SouthEast, &old, 140, 90), (-40, 10));
        assert_eq!(mouse_deltas_for_resize(Gravity::Center, &old, 140, 90), (20, -5));
    }

    #[test]
    fn test_resize_with_gravity_keeps_anchor() {
        let rect = Geometry::new(100, 100, 200, 100);
        assert_eq!(resize_with_gravity(&rect, 240, 100, Gravity::West), Geometry::new(100, 100, 240, 100));
        assert_eq!(resize_with_gravity(&rect, 240, 100, Gravity::East), Geometry::new(60, 100, 240, 100));
        assert_eq!(resize_with_gravity(&rect, 200, 80, Gravity::South), Geometry::new(100, 120, 200, 80));
    }

    fn framed_input(old: Geometry, new: Geometry) -> PlanInput {
        let borders = FrameBorders::new(2, 2, 20, 2);
        PlanInput {
            flags: MoveResizeFlags::empty(),
            old_rect: old,
            new_rect: new,
            old_frame_rect: Some(borders.frame_rect(&old, false)),
            old_borders: Some(borders),
            new_borders: Some(borders),
            shaded: false,
            border_width: 0,
            static_gravity_works: false,
        }
    }

    #[test]
    fn test_plan_move_only_sends_notify() {
        let old = Geometry::new(100, 100, 300, 200);
        let new = Geometry::new(150, 120, 300, 200);
        let plan = plan_configure(&framed_input(old, new));
        assert!(plan.need_move_frame);
        assert!(!plan.need_resize_client);
        assert!(!plan.need_move_client);
        assert!(plan.client_changes.is_none());
        assert!(plan.need_configure_notify);
        let frame = plan.frame_changes.unwrap();
        assert_eq!((frame.x, frame.y), (Some(148), Some(100)));
        assert_eq!(frame.width, None);
    }

    #[test]
    fn test_plan_grow_configures_frame_first() {
        let old = Geometry::new(100, 100, 300, 200);
        let grow = plan_configure(&framed_input(old, Geometry::new(100, 100, 340, 200)));
        assert!(grow.configure_frame_first);
        assert!(!grow.need_configure_notify);
        let shrink = plan_configure(&framed_input(old, Geometry::new(100, 100, 260, 200)));
        assert!(!shrink.configure_frame_first);
        assert_eq!(shrink.client_changes.unwrap().width, Some(260));
    }

    #[test]
    fn test_plan_static_gravity_compensates() {
        let old = Geometry::new(100, 100, 300, 200);
        let mut input = framed_input(old, Geometry::new(80, 90, 320, 210));
        input.static_gravity_works = true;
        let plan = plan_configure(&input);
        assert!(plan.use_static_gravity);
        let client = plan.client_changes.unwrap();
        assert_eq!((client.x, client.y), (Some(2 - 20), Some(20 - 10)));
    }

    #[test]
    fn test_plan_noop_configure_request_answers() {
        let old = Geometry::new(100, 100, 300, 200);
        let mut input = framed_input(old, old);
        input.flags = MoveResizeFlags::IS_CONFIGURE_REQUEST;
        let plan = plan_configure(&input);
        assert!(plan.need_configure_notify);
        assert!(plan.client_changes.is_none());
        assert!(plan.frame_changes.is_none());

        input.border_width = 1;
        let plan = plan_configure(&input);
        assert!(!plan.need_configure_notify);
        assert_eq!(plan.client_changes.unwrap().border_width, Some(0));
    }

    #[test]
    fn test_plan_unframed_move() {
        let old = Geometry::new(10, 10, 50, 50);
        let input = PlanInput {
            flags: MoveResizeFlags::empty(),
            old_rect: old,
            new_rect: Geometry::new(20, 10, 50, 50),
            old_frame_rect: None,
            old_borders: None,
            new_borders: None,
            shaded: false,
            border_width: 0,
            static_gravity_works: false,
        };
        let plan = plan_configure(&input);
        let client = plan.client_changes.unwrap();
        assert_eq!((client.x, client.y, client.width), (Some(20), Some(10), None));
        assert!(plan.need_configure_notify);
    }
}
