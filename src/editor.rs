// src/editor.rs
//
// Canvas editor: owns the ordered layer list and translates pointer input
// into geometry changes. Interaction state is a value recomputed on every
// pointer-down and anchored there, so motion is always computed against the
// anchor instead of accumulating increments.
use uuid::Uuid;

use crate::errors::MontageError;
use crate::models::{ContextMenu, HandleKind, ImageLayer, TransformHandle};

pub const CANVAS_WIDTH: f64 = 800.0;
pub const CANVAS_HEIGHT: f64 = 600.0;
pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 3.0;
/// Newly inserted layers are sized to fit this bounding box.
pub const MAX_INSERT_SIZE: f64 = 200.0;

const HANDLE_SIZE: f64 = 8.0;
const ROTATE_HANDLE_DISTANCE: f64 = 30.0;

#[derive(Debug, Clone, Copy)]
enum Interaction {
    Move {
        layer: Uuid,
        offset_x: f64,
        offset_y: f64,
    },
    Scale {
        layer: Uuid,
        anchor_scale: f64,
        anchor_distance: f64,
        // Center at interaction start. The live center shifts as the scale
        // changes, so measuring against it would make the gesture drift.
        anchor_cx: f64,
        anchor_cy: f64,
    },
    Rotate {
        layer: Uuid,
    },
}

#[derive(Debug)]
pub struct CanvasEditor {
    layers: Vec<ImageLayer>,
    selected: Option<Uuid>,
    interaction: Option<Interaction>,
    context_menu: ContextMenu,
}

impl Default for CanvasEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasEditor {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            selected: None,
            interaction: None,
            context_menu: ContextMenu::hidden(),
        }
    }

    pub fn layers(&self) -> &[ImageLayer] {
        &self.layers
    }

    pub fn selected(&self) -> Option<Uuid> {
        self.selected
    }

    pub fn context_menu(&self) -> &ContextMenu {
        &self.context_menu
    }

    pub fn layer(&self, id: Uuid) -> Result<&ImageLayer, MontageError> {
        self.layers
            .iter()
            .find(|l| l.id == id)
            .ok_or(MontageError::LayerNotFound(id))
    }

    fn layer_mut(&mut self, id: Uuid) -> Result<&mut ImageLayer, MontageError> {
        self.layers
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(MontageError::LayerNotFound(id))
    }

    fn index_of(&self, id: Uuid) -> Result<usize, MontageError> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or(MontageError::LayerNotFound(id))
    }

    /// Appends a layer, making it the topmost one.
    pub fn add_layer(&mut self, layer: ImageLayer) -> Uuid {
        let id = layer.id;
        self.layers.push(layer);
        id
    }

    pub fn select(&mut self, id: Uuid) -> Result<(), MontageError> {
        self.index_of(id)?;
        self.selected = Some(id);
        Ok(())
    }

    pub fn remove_layer(&mut self, id: Uuid) -> Result<(), MontageError> {
        let idx = self.index_of(id)?;
        self.layers.remove(idx);
        if self.selected == Some(id) {
            self.selected = None;
        }
        if self.context_menu.layer_id == Some(id) {
            self.context_menu = ContextMenu::hidden();
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.layers.clear();
        self.selected = None;
        self.interaction = None;
        self.context_menu = ContextMenu::hidden();
    }

    /// Sets scale and/or rotation directly, with the same clamping and
    /// normalization the drag gestures apply.
    pub fn set_transform(
        &mut self,
        id: Uuid,
        scale: Option<f64>,
        rotation: Option<f64>,
    ) -> Result<(), MontageError> {
        let layer = self.layer_mut(id)?;
        if let Some(s) = scale {
            layer.scale = s.clamp(MIN_SCALE, MAX_SCALE);
        }
        if let Some(r) = rotation {
            layer.rotation = r.rem_euclid(360.0);
        }
        Ok(())
    }

    pub fn reset_transform(&mut self, id: Uuid) -> Result<(), MontageError> {
        let layer = self.layer_mut(id)?;
        layer.scale = 1.0;
        layer.rotation = 0.0;
        self.context_menu = ContextMenu::hidden();
        Ok(())
    }

    // --- z-order ---
    //
    // All four reorder operations are no-ops (not errors) when the layer is
    // already at the target boundary.

    pub fn bring_to_front(&mut self, id: Uuid) -> Result<(), MontageError> {
        let idx = self.index_of(id)?;
        if idx + 1 != self.layers.len() {
            let layer = self.layers.remove(idx);
            self.layers.push(layer);
        }
        self.context_menu = ContextMenu::hidden();
        Ok(())
    }

    pub fn send_to_back(&mut self, id: Uuid) -> Result<(), MontageError> {
        let idx = self.index_of(id)?;
        if idx != 0 {
            let layer = self.layers.remove(idx);
            self.layers.insert(0, layer);
        }
        self.context_menu = ContextMenu::hidden();
        Ok(())
    }

    pub fn bring_forward(&mut self, id: Uuid) -> Result<(), MontageError> {
        let idx = self.index_of(id)?;
        if idx + 1 < self.layers.len() {
            self.layers.swap(idx, idx + 1);
        }
        self.context_menu = ContextMenu::hidden();
        Ok(())
    }

    pub fn send_backward(&mut self, id: Uuid) -> Result<(), MontageError> {
        let idx = self.index_of(id)?;
        if idx > 0 {
            self.layers.swap(idx, idx - 1);
        }
        self.context_menu = ContextMenu::hidden();
        Ok(())
    }

    // --- hit testing ---

    /// Scans back-to-front (topmost first) and returns the first layer whose
    /// scaled bounding box contains the point.
    pub fn locate_layer_at(&self, x: f64, y: f64) -> Option<&ImageLayer> {
        self.layers.iter().rev().find(|l| l.contains(x, y))
    }

    /// The two handles for a layer: scale on the bottom-right corner of the
    /// scaled box, rotate 30px above the top-center.
    pub fn transform_handles(layer: &ImageLayer) -> [TransformHandle; 2] {
        let (center_x, _) = layer.center();
        [
            TransformHandle {
                kind: HandleKind::Scale,
                x: layer.x + layer.scaled_width() - HANDLE_SIZE / 2.0,
                y: layer.y + layer.scaled_height() - HANDLE_SIZE / 2.0,
                size: HANDLE_SIZE,
            },
            TransformHandle {
                kind: HandleKind::Rotate,
                x: center_x - HANDLE_SIZE / 2.0,
                y: layer.y - ROTATE_HANDLE_DISTANCE,
                size: HANDLE_SIZE,
            },
        ]
    }

    fn handle_at(&self, x: f64, y: f64, id: Uuid) -> Option<HandleKind> {
        let layer = self.layers.iter().find(|l| l.id == id)?;
        Self::transform_handles(layer)
            .into_iter()
            .find(|h| h.contains(x, y))
            .map(|h| h.kind)
    }

    // --- pointer input ---

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.context_menu = ContextMenu::hidden();

        // Handles of the selected layer win over layer hits.
        if let Some(selected) = self.selected {
            if let Some(kind) = self.handle_at(x, y, selected) {
                let layer = match self.layer(selected) {
                    Ok(l) => l,
                    Err(_) => return,
                };
                self.interaction = Some(match kind {
                    HandleKind::Scale => {
                        let (cx, cy) = layer.center();
                        Interaction::Scale {
                            layer: selected,
                            anchor_scale: layer.scale,
                            anchor_distance: ((x - cx).powi(2) + (y - cy).powi(2)).sqrt(),
                            anchor_cx: cx,
                            anchor_cy: cy,
                        }
                    }
                    HandleKind::Rotate => Interaction::Rotate { layer: selected },
                });
                return;
            }
        }

        if let Some(hit) = self.locate_layer_at(x, y).map(|l| (l.id, l.x, l.y)) {
            self.selected = Some(hit.0);
            self.interaction = Some(Interaction::Move {
                layer: hit.0,
                offset_x: x - hit.1,
                offset_y: y - hit.2,
            });
        } else {
            self.selected = None;
        }
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) {
        let Some(interaction) = self.interaction else {
            return;
        };
        match interaction {
            Interaction::Move {
                layer,
                offset_x,
                offset_y,
            } => {
                if let Ok(l) = self.layer_mut(layer) {
                    l.x = (x - offset_x).min(CANVAS_WIDTH - l.scaled_width()).max(0.0);
                    l.y = (y - offset_y)
                        .min(CANVAS_HEIGHT - l.scaled_height())
                        .max(0.0);
                }
            }
            Interaction::Scale {
                layer,
                anchor_scale,
                anchor_distance,
                anchor_cx,
                anchor_cy,
            } => {
                if anchor_distance <= f64::EPSILON {
                    return;
                }
                if let Ok(l) = self.layer_mut(layer) {
                    let distance = ((x - anchor_cx).powi(2) + (y - anchor_cy).powi(2)).sqrt();
                    l.scale =
                        (anchor_scale * distance / anchor_distance).clamp(MIN_SCALE, MAX_SCALE);
                }
            }
            Interaction::Rotate { layer } => {
                if let Ok(l) = self.layer_mut(layer) {
                    let (cx, cy) = l.center();
                    // +90 so that straight up reads as 0 degrees.
                    let degrees = (y - cy).atan2(x - cx).to_degrees() + 90.0;
                    l.rotation = degrees.rem_euclid(360.0);
                }
            }
        }
    }

    /// Ends the active interaction unconditionally.
    pub fn pointer_up(&mut self) {
        self.interaction = None;
    }

    /// Double-click removes the hit layer; a miss does nothing.
    pub fn double_click(&mut self, x: f64, y: f64) {
        if let Some(id) = self.locate_layer_at(x, y).map(|l| l.id) {
            let _ = self.remove_layer(id);
        }
    }

    /// Right-click: opens the menu on a hit layer, closes it on a miss.
    pub fn open_context_menu(&mut self, x: f64, y: f64) {
        match self.locate_layer_at(x, y).map(|l| l.id) {
            Some(id) => {
                self.context_menu = ContextMenu {
                    visible: true,
                    x,
                    y,
                    layer_id: Some(id),
                };
            }
            None => self.context_menu = ContextMenu::hidden(),
        }
    }

    pub fn dismiss_context_menu(&mut self) {
        self.context_menu = ContextMenu::hidden();
    }
}
