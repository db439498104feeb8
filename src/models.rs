// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One placed image on the canvas with its own transform.
///
/// `width`/`height` are fixed at insertion from the natural aspect ratio of
/// the source capped to a 200px box; only `scale` and `rotation` change
/// afterwards. Paint order of the containing sequence is z-order, last on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageLayer {
    pub id: Uuid,
    /// Where the pixels came from: an upload filename or a fetched URL.
    pub source: String,
    /// Encoded source bytes, decoded on demand by the compositor. Not
    /// serialized into state responses.
    #[serde(skip)]
    pub data: Vec<u8>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
    pub rotation: f64,
    pub added_at: DateTime<Utc>,
}

impl ImageLayer {
    pub fn new(source: String, data: Vec<u8>, width: f64, height: f64, x: f64, y: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            data,
            x,
            y,
            width,
            height,
            scale: 1.0,
            rotation: 0.0,
            added_at: Utc::now(),
        }
    }

    pub fn scaled_width(&self) -> f64 {
        self.width * self.scale
    }

    pub fn scaled_height(&self) -> f64 {
        self.height * self.scale
    }

    /// Center of the axis-aligned scaled bounding box.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x + self.scaled_width() / 2.0,
            self.y + self.scaled_height() / 2.0,
        )
    }

    /// Axis-aligned bounding-box containment; rotation is deliberately
    /// ignored, matching the handle model.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x
            && x <= self.x + self.scaled_width()
            && y >= self.y
            && y <= self.y + self.scaled_height()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    Scale,
    Rotate,
}

/// Interactive hotspot for the selected layer. Recomputed on every use, never
/// stored. The hit boxes stay axis-aligned in canvas space, so at large
/// rotation angles they can visually detach from the image corner; accepted
/// approximation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TransformHandle {
    pub kind: HandleKind,
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

impl TransformHandle {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.size && y >= self.y && y <= self.y + self.size
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextMenu {
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub layer_id: Option<Uuid>,
}

impl ContextMenu {
    pub fn hidden() -> Self {
        Self {
            visible: false,
            x: 0.0,
            y: 0.0,
            layer_id: None,
        }
    }
}

/// Terminal prediction states are `succeeded`, `failed` and `canceled`;
/// everything else keeps the poll loop going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PredictionStatus::Succeeded | PredictionStatus::Failed | PredictionStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    #[serde(rename = "image1")]
    Image1,
    #[serde(rename = "image2")]
    Image2,
}

/// Outcome of judging two candidate enhancements against each other.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub winner: Winner,
    pub reason: String,
    pub score1: u8,
    pub score2: u8,
    pub image1_url: Option<String>,
    pub image2_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PexelsPhoto {
    pub id: u64,
    pub url: String,
    pub alt: String,
    pub photographer: String,
    pub photographer_url: String,
}

// --- request/response shapes ---

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerEvent {
    Down,
    Move,
    Up,
    Double,
    Menu,
    Dismiss,
}

#[derive(Debug, Deserialize)]
pub struct PointerRequest {
    pub event: PointerEvent,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOp {
    BringToFront,
    BringForward,
    SendBackward,
    SendToBack,
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub op: OrderOp,
}

#[derive(Debug, Deserialize)]
pub struct TransformPatch {
    pub scale: Option<f64>,
    pub rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AddUrlImageRequest {
    pub url: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct EnhanceRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub compare: bool,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct PexelsQuery {
    #[serde(default)]
    pub query: Option<String>,
}
