//! Controllable particle state and the external capabilities the session core
//! is allowed to use: a write-only state sink and a write-only log sink. The
//! core never reads current state back and never reads its own log history.

use serde::{Deserialize, Serialize};

/// Geometry the particle system can morph into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeType {
    Sphere,
    TorusKnot,
    Heart,
    Mandala,
}

impl ShapeType {
    pub const ALL: [ShapeType; 4] = [
        ShapeType::Sphere,
        ShapeType::TorusKnot,
        ShapeType::Heart,
        ShapeType::Mandala,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeType::Sphere => "sphere",
            ShapeType::TorusKnot => "torus_knot",
            ShapeType::Heart => "heart",
            ShapeType::Mandala => "mandala",
        }
    }

    pub fn parse(value: &str) -> Option<ShapeType> {
        ShapeType::ALL.iter().copied().find(|s| s.as_str() == value)
    }
}

/// Declared domain for `scale`.
pub const SCALE_BOUNDS: (f64, f64) = (0.5, 3.0);
/// Declared domain for `expansion`.
pub const EXPANSION_BOUNDS: (f64, f64) = (0.5, 5.0);
/// Declared domain for `speed`.
pub const SPEED_BOUNDS: (f64, f64) = (0.01, 0.2);

/// Full parameter set of the visual scene. Owned by the host application;
/// the session core only ever writes partial updates through a [`StateSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleState {
    pub shape: ShapeType,
    pub scale: f64,
    pub expansion: f64,
    pub speed: f64,
    pub color: String,
}

impl Default for ParticleState {
    fn default() -> Self {
        Self {
            shape: ShapeType::Sphere,
            scale: 1.0,
            expansion: 1.0,
            speed: 0.05,
            color: "#00ffff".to_string(),
        }
    }
}

impl ParticleState {
    /// Merges a partial update. Absent fields are left untouched.
    pub fn apply(&mut self, update: &ParticleUpdate) {
        if let Some(shape) = update.shape {
            self.shape = shape;
        }
        if let Some(scale) = update.scale {
            self.scale = scale;
        }
        if let Some(expansion) = update.expansion {
            self.expansion = expansion;
        }
        if let Some(speed) = update.speed {
            self.speed = speed;
        }
        if let Some(color) = &update.color {
            self.color = color.clone();
        }
    }
}

/// A validated partial change to [`ParticleState`]. Every field independently
/// optional; numeric fields are already clamped into their declared domains
/// by the time a value lands here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<ShapeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ParticleUpdate {
    pub fn is_empty(&self) -> bool {
        self.shape.is_none()
            && self.scale.is_none()
            && self.expansion.is_none()
            && self.speed.is_none()
            && self.color.is_none()
    }
}

/// Clamps a value to the nearest bound of its declared domain. Out-of-range
/// remote values stay usable instead of being rejected.
pub fn clamp_to_bounds(value: f64, bounds: (f64, f64)) -> f64 {
    value.clamp(bounds.0, bounds.1)
}

/// Accepts `#rgb` and `#rrggbb` hex color specifications.
pub fn is_valid_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    (digits.len() == 3 || digits.len() == 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Category for user-visible log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Info,
    Ai,
    Error,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Info => "info",
            LogCategory::Ai => "ai",
            LogCategory::Error => "error",
        }
    }
}

/// Write capability over the externally owned particle state.
pub trait StateSink: Send + Sync {
    fn apply(&self, update: ParticleUpdate);
}

/// Write-only capability for emitting human-readable session events.
pub trait LogSink: Send + Sync {
    fn emit(&self, message: &str, category: LogCategory);
}
