//! Pointer-to-thumbnail lookup for scrub previews.

use std::sync::Arc;

use serde::Serialize;

use crate::cue::{Cue, CueTrack};

/// The hover surface, in the same coordinate space as pointer events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Size and placement of the preview popup relative to the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewGeometry {
    /// Popup width including its frame.
    pub width: f64,
    /// Popup height including its frame.
    pub height: f64,
    /// Horizontal distance from the pointer to the popup's left edge.
    pub offset_x: f64,
    /// Vertical distance from the pointer to the popup's top edge.
    pub offset_y: f64,
    /// Minimum distance kept from the container edges.
    pub margin: f64,
}

impl Default for PreviewGeometry {
    fn default() -> Self {
        // 120px wide 16:9 thumbnail plus a 4px frame, centred above the pointer.
        Self {
            width: 124.0,
            height: 76.0,
            offset_x: 60.0,
            offset_y: 100.0,
            margin: 4.0,
        }
    }
}

/// What the preview popup should show.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreviewState {
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub image: Option<Arc<str>>,
}

impl PreviewState {
    pub fn hidden() -> Self {
        Self::default()
    }
}

/// Maps pointer positions to cues and keeps the popup inside its container.
#[derive(Debug, Clone, Default)]
pub struct ScrubPreviewEngine {
    geometry: PreviewGeometry,
    state: PreviewState,
}

impl ScrubPreviewEngine {
    pub fn new(geometry: PreviewGeometry) -> Self {
        Self {
            geometry,
            state: PreviewState::hidden(),
        }
    }

    pub fn geometry(&self) -> &PreviewGeometry {
        &self.geometry
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    /// Compute the preview for one pointer position.
    ///
    /// `duration` is the media duration in seconds. A non-finite or
    /// non-positive duration, an empty track, or a degenerate container hides
    /// the preview without looking anything up.
    pub fn lookup(
        &self,
        pointer_x: f64,
        pointer_y: f64,
        bounds: &BoundingBox,
        duration: f64,
        track: &CueTrack,
    ) -> PreviewState {
        if !duration.is_finite() || duration <= 0.0 || track.is_empty() {
            return PreviewState::hidden();
        }
        if !bounds.width.is_finite() || bounds.width <= 0.0 {
            return PreviewState::hidden();
        }

        let x = pointer_x - bounds.left;
        let y = pointer_y - bounds.top;
        let ratio = x.clamp(0.0, bounds.width) / bounds.width;
        if !ratio.is_finite() {
            return PreviewState::hidden();
        }
        let time = ratio * duration;

        match cue_at(track, time) {
            Some(cue) => PreviewState {
                visible: true,
                x: clamp_axis(
                    x - self.geometry.offset_x,
                    self.geometry.margin,
                    bounds.width - self.geometry.width - self.geometry.margin,
                ),
                y: clamp_axis(
                    y - self.geometry.offset_y,
                    self.geometry.margin,
                    bounds.height - self.geometry.height - self.geometry.margin,
                ),
                image: Some(Arc::clone(&cue.image)),
            },
            None => PreviewState::hidden(),
        }
    }

    /// Handle a pointer move, updating the retained state.
    ///
    /// When no cue matches, the popup is hidden but keeps its last position so
    /// it does not jump when it reappears.
    pub fn on_pointer_move(
        &mut self,
        pointer_x: f64,
        pointer_y: f64,
        bounds: &BoundingBox,
        duration: f64,
        track: &CueTrack,
    ) -> &PreviewState {
        let next = self.lookup(pointer_x, pointer_y, bounds, duration, track);
        if next.visible {
            self.state = next;
        } else {
            self.state.visible = false;
        }
        &self.state
    }

    /// Pointer left the hover surface.
    pub fn on_pointer_leave(&mut self) -> &PreviewState {
        self.state = Self::leave(&self.state);
        &self.state
    }

    /// Hidden copy of `state` that keeps its position and image.
    pub fn leave(state: &PreviewState) -> PreviewState {
        PreviewState {
            visible: false,
            ..state.clone()
        }
    }

    /// Forget everything, e.g. when the track is replaced.
    pub fn reset(&mut self) {
        self.state = PreviewState::hidden();
    }
}

/// Guess the cue at index `floor(time)` first, which is exact for one-second
/// tracks, then fall back to a binary search.
fn cue_at(track: &CueTrack, time: f64) -> Option<&Cue> {
    let guess = (time.floor().max(0.0) as usize).min(track.len() - 1);
    match track.get(guess) {
        Some(cue) if cue.contains(time) => Some(cue),
        _ => track.find(time),
    }
}

fn clamp_axis(value: f64, min: f64, max: f64) -> f64 {
    if max < min {
        min
    } else {
        value.clamp(min, max)
    }
}
