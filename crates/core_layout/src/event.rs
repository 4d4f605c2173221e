//! Events consumed by the coordinator and the prioritized queue that
//! serializes them.

use crate::coordinator::{MonitorArea, NewWindow};
use crate::drag::PointerSample;
use crate::swap::Direction;
use crate::{Point, WindowId};
use std::collections::VecDeque;

/// Operations issued by the input/hotkey layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilingCommand {
    ToggleTiling,
    SetTiling(bool),
    ForceRetile,
    EnterSwap,
    SwapMove(Direction),
    ExitSwap,
    /// Toggle floating for the focused window.
    ToggleFloat,
    /// Zero-based workspace index.
    SwitchWorkspace(usize),
    MoveWorkspaceToNextMonitor,
    BeginDrag { window: WindowId, pointer: Point },
    UpdateDrag(Point),
    EndDrag(Point),
    CancelDrag,
}

/// Everything that can mutate tiling state.
#[derive(Debug, Clone, PartialEq)]
pub enum TilingEvent {
    TopologyChanged(Vec<MonitorArea>),
    WindowAdded(NewWindow),
    WindowRemoved(WindowId),
    WindowMaximized(WindowId),
    WindowMinimized(WindowId),
    WindowRestored(WindowId),
    WindowFocused(WindowId),
    Command(TilingCommand),
    Pointer(PointerSample),
}

impl TilingEvent {
    /// Priority class, lower runs first.
    pub fn priority(&self) -> usize {
        match self {
            Self::TopologyChanged(_) => 0,
            Self::WindowAdded(_)
            | Self::WindowRemoved(_)
            | Self::WindowMaximized(_)
            | Self::WindowMinimized(_)
            | Self::WindowRestored(_)
            | Self::WindowFocused(_) => 1,
            Self::Command(_) => 2,
            Self::Pointer(_) => 3,
        }
    }
}

const PRIORITY_CLASSES: usize = 4;

/// Ordered event stream feeding the single-threaded coordinator.
///
/// Topology changes drain before window lifecycle events, which drain
/// before commands, which drain before pointer samples. Order within a
/// class is FIFO. A pointer sample replaces the queued one before it when
/// both have the same button state and title-bar window, so button
/// edges are never lost.
#[derive(Debug, Default)]
pub struct EventQueue {
    classes: [VecDeque<TilingEvent>; PRIORITY_CLASSES],
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TilingEvent) {
        let class = &mut self.classes[event.priority()];
        if let TilingEvent::Pointer(sample) = &event {
            if let Some(TilingEvent::Pointer(last)) = class.back_mut() {
                if last.left_down == sample.left_down
                    && last.title_bar_window == sample.title_bar_window
                {
                    *last = *sample;
                    return;
                }
            }
        }
        class.push_back(event);
    }

    pub fn pop(&mut self) -> Option<TilingEvent> {
        self.classes.iter_mut().find_map(VecDeque::pop_front)
    }

    pub fn len(&self) -> usize {
        self.classes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.iter().all(VecDeque::is_empty)
    }
}

impl Extend<TilingEvent> for EventQueue {
    fn extend<T: IntoIterator<Item = TilingEvent>>(&mut self, iter: T) {
        for event in iter {
            self.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rect;

    fn pointer(x: i32, down: bool) -> TilingEvent {
        TilingEvent::Pointer(PointerSample {
            position: Point::new(x, 0),
            left_down: down,
            title_bar_window: None,
        })
    }

    #[test]
    fn test_priority_order() {
        let mut queue = EventQueue::new();
        queue.push(pointer(1, false));
        queue.push(TilingEvent::Command(TilingCommand::ForceRetile));
        queue.push(TilingEvent::WindowRemoved(4));
        queue.push(TilingEvent::TopologyChanged(vec![MonitorArea {
            id: 1,
            work_area: Rect::new(0, 0, 800, 600),
        }]));

        assert!(matches!(queue.pop(), Some(TilingEvent::TopologyChanged(_))));
        assert_eq!(queue.pop(), Some(TilingEvent::WindowRemoved(4)));
        assert_eq!(
            queue.pop(),
            Some(TilingEvent::Command(TilingCommand::ForceRetile))
        );
        assert!(matches!(queue.pop(), Some(TilingEvent::Pointer(_))));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_class() {
        let mut queue = EventQueue::new();
        queue.push(TilingEvent::WindowMaximized(1));
        queue.push(TilingEvent::WindowRestored(1));
        assert_eq!(queue.pop(), Some(TilingEvent::WindowMaximized(1)));
        assert_eq!(queue.pop(), Some(TilingEvent::WindowRestored(1)));
    }

    #[test]
    fn test_pointer_moves_coalesce() {
        let mut queue = EventQueue::new();
        queue.push(pointer(1, true));
        queue.push(pointer(2, true));
        queue.push(pointer(3, true));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(pointer(3, true)));
    }

    #[test]
    fn test_button_edges_survive_coalescing() {
        let mut queue = EventQueue::new();
        queue.extend([
            pointer(1, false),
            pointer(2, true),
            pointer(3, true),
            pointer(4, false),
        ]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(pointer(1, false)));
        assert_eq!(queue.pop(), Some(pointer(3, true)));
        assert_eq!(queue.pop(), Some(pointer(4, false)));
        assert!(queue.is_empty());
    }
}
