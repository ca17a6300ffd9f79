//! Input side of the compiler: waypoints, per-waypoint attribute streams and the
//! coordinate transform that carries them into the controller frame.

use crate::error::{KrlError, KrlResult};
use glam::{DAffine3, DQuat, DVec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Factor converting scene meters to controller millimeters.
pub const METERS_TO_MILLIMETERS: f64 = 1000.0;

/// A single point of the path, visited in sequence order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Position in the local (object) frame.
    pub position: DVec3,

    /// Tool orientation as KUKA A, B, C angles in degrees.
    /// `None` falls back to the compiler's default orientation.
    #[serde(default)]
    pub orientation: Option<DVec3>,
}

impl Waypoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: DVec3::new(x, y, z),
            orientation: None,
        }
    }

    pub fn with_orientation(mut self, a: f64, b: f64, c: f64) -> Self {
        self.orientation = Some(DVec3::new(a, b, c));
        self
    }
}

impl From<DVec3> for Waypoint {
    fn from(position: DVec3) -> Self {
        Self {
            position,
            orientation: None,
        }
    }
}

/// A process value attached to a waypoint.
///
/// Booleans compare by identity, numbers by exact equality of their value, so
/// `Int(100)` equals `Float(100.0)`. A boolean never equals a number.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(_), _) | (_, Self::Bool(_)) => false,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl AttributeValue {
    /// Numeric view of the value; booleans have none.
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::Bool(_) => None,
            Self::Int(i) => Some(i as f64),
            Self::Float(f) => Some(f),
        }
    }

    /// Serializes the value as a KRL literal: `TRUE`/`FALSE` or six decimal places.
    pub fn to_krl(self) -> KrlResult<String> {
        match self {
            Self::Float(f) if !f.is_finite() => Err(KrlError::unsupported_value(format!(
                "{f} has no KRL representation"
            ))),
            _ => Ok(self.literal()),
        }
    }

    pub(crate) fn literal(self) -> String {
        match self {
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Int(i) => format!("{:.6}", i as f64),
            Self::Float(f) => format!("{f:.6}"),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for AttributeValue {
    fn from(v: f32) -> Self {
        Self::Float(v.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// A sparse mapping from waypoint index to an optional value.
///
/// Indices past the end of the stream, and explicit `None` entries, are absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeStream {
    values: Vec<Option<AttributeValue>>,
}

impl AttributeStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dense stream with a value at every index.
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        Self {
            values: values.into_iter().map(|v| Some(v.into())).collect(),
        }
    }

    /// A stream with explicit gaps.
    pub fn from_options<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<V>>,
        V: Into<AttributeValue>,
    {
        Self {
            values: values.into_iter().map(|v| v.map(Into::into)).collect(),
        }
    }

    /// A stream holding values only at the given indices. Later entries win.
    pub fn sparse<I, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (usize, V)>,
        V: Into<AttributeValue>,
    {
        let mut stream = Self::new();
        for (index, value) in entries {
            stream.set(index, value);
        }
        stream
    }

    /// Sets the value at `index`, growing the stream with gaps as needed.
    pub fn set(&mut self, index: usize, value: impl Into<AttributeValue>) {
        if index >= self.values.len() {
            self.values.resize(index + 1, None);
        }
        self.values[index] = Some(value.into());
    }

    pub fn get(&self, index: usize) -> Option<AttributeValue> {
        self.values.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An ordered path with its process attributes, as exported from a modeling scene.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Toolpath {
    pub waypoints: Vec<Waypoint>,

    /// TCP speed in m/s per waypoint (`$VEL.CP`).
    #[serde(default)]
    pub path_speed: Option<AttributeStream>,

    /// Named controller variables (e.g. `E_SPEED`, `E_ENABLE`, `F_SPEED`).
    #[serde(default)]
    pub variables: BTreeMap<String, AttributeStream>,
}

impl Toolpath {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self {
            waypoints,
            ..Default::default()
        }
    }

    pub fn with_path_speed(mut self, stream: AttributeStream) -> Self {
        self.path_speed = Some(stream);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, stream: AttributeStream) -> Self {
        self.variables.insert(name.into(), stream);
        self
    }

    /// Parses a toolpath from JSON.
    pub fn from_json(json: &str) -> KrlResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| KrlError::input(format!("malformed toolpath: {e}")))
    }
}

/// Carries local waypoint positions into the controller frame.
///
/// The rigid/affine part is applied first, then every axis is multiplied by
/// `unit_scale` (usually meters to millimeters).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathTransform {
    pub affine: DAffine3,
    pub unit_scale: DVec3,
}

impl Default for PathTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl PathTransform {
    pub const IDENTITY: Self = Self {
        affine: DAffine3::IDENTITY,
        unit_scale: DVec3::ONE,
    };

    pub fn new(affine: DAffine3, unit_scale: DVec3) -> Self {
        Self { affine, unit_scale }
    }

    /// An object world matrix followed by the meter to millimeter conversion.
    pub fn meters_to_millimeters(affine: DAffine3) -> Self {
        Self::new(affine, DVec3::splat(METERS_TO_MILLIMETERS))
    }

    pub fn from_scale_rotation_translation(
        scale: DVec3,
        rotation: DQuat,
        translation: DVec3,
    ) -> Self {
        Self::new(
            DAffine3::from_scale_rotation_translation(scale, rotation, translation),
            DVec3::ONE,
        )
    }

    pub fn with_unit_scale(mut self, unit_scale: DVec3) -> Self {
        self.unit_scale = unit_scale;
        self
    }

    pub fn apply(&self, local: DVec3) -> DVec3 {
        self.affine.transform_point3(local) * self.unit_scale
    }
}

/// The scene or geometry collaborator that yields a toolpath.
///
/// A failing source aborts compilation; waypoints are never silently dropped.
pub trait PathSource {
    fn load_toolpath(&self) -> anyhow::Result<Toolpath>;
}

impl PathSource for Toolpath {
    fn load_toolpath(&self) -> anyhow::Result<Toolpath> {
        Ok(self.clone())
    }
}
