//! Change records consumed by `PhysicsEngine::apply_changes`.
//!
//! A batch is a list of records tagged by `type`:
//!
//! ```json
//! [
//!   {"type": "addNode", "id": 1, "x": 0, "y": 0, "m": 1, "f": 0},
//!   {"type": "addSpring", "id": 7, "fm": 1, "to": 2, "l": 30},
//!   {"type": "modifyNode", "id": 1, "overrideMass": 50},
//!   {"type": "dropSpring", "id": 7},
//!   {"type": "dropNode", "id": 1}
//! ]
//! ```
//!
//! Records with an unrecognized `type` deserialize to `Change::Unknown` and
//! are skipped by the engine.

use serde::{Deserialize, Serialize};

use super::particle::NodeId;
use super::spring::SpringId;

/// One topology or node mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Change {
    AddNode(NodeSpec),
    DropNode {
        id: NodeId,
    },
    ModifyNode {
        id: NodeId,
        #[serde(flatten)]
        mods: NodeMods,
    },
    AddSpring(SpringSpec),
    DropSpring {
        id: SpringId,
    },
    #[serde(other)]
    Unknown,
}

/// Fields of an `addNode` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(rename = "m", default = "default_mass")]
    pub mass: f32,
    #[serde(rename = "f", default, with = "flag")]
    pub fixed: bool,
}

impl NodeSpec {
    /// A unit-mass, free-floating node placed at random within the bounds.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            x: None,
            y: None,
            mass: default_mass(),
            fixed: false,
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }
}

/// Fields of an `addSpring` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpringSpec {
    pub id: SpringId,
    #[serde(rename = "fm")]
    pub from: NodeId,
    pub to: NodeId,
    #[serde(rename = "l", default = "default_length")]
    pub length: f32,
}

impl SpringSpec {
    pub fn new(id: SpringId, from: NodeId, to: NodeId, length: f32) -> Self {
        Self {
            id,
            from,
            to,
            length,
        }
    }
}

/// Partial update to a single particle. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMods {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(rename = "m", default, skip_serializing_if = "Option::is_none")]
    pub mass: Option<f32>,
    #[serde(
        rename = "f",
        default,
        skip_serializing_if = "Option::is_none",
        with = "flag::option"
    )]
    pub fixed: Option<bool>,
    #[serde(
        rename = "overrideMass",
        alias = "_m",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub override_mass: Option<f32>,
}

impl NodeMods {
    pub fn position(x: f32, y: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }
}

impl Change {
    /// The record's `type` tag, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Change::AddNode(_) => "addNode",
            Change::DropNode { .. } => "dropNode",
            Change::ModifyNode { .. } => "modifyNode",
            Change::AddSpring(_) => "addSpring",
            Change::DropSpring { .. } => "dropSpring",
            Change::Unknown => "unknown",
        }
    }
}

/// Parse a JSON array of change records.
pub fn parse_batch(json: &str) -> Result<Vec<Change>, serde_json::Error> {
    serde_json::from_str(json)
}

fn default_mass() -> f32 {
    1.0
}

fn default_length() -> f32 {
    1.0
}

/// The `f` field is `0 | 1` on the wire; booleans are accepted too.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bool(bool),
        Int(i64),
        Float(f64),
    }

    impl From<Repr> for bool {
        fn from(repr: Repr) -> bool {
            match repr {
                Repr::Bool(b) => b,
                Repr::Int(i) => i == 1,
                Repr::Float(f) => f == 1.0,
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Repr::deserialize(deserializer).map(bool::from)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        use super::Repr;

        pub fn serialize<S: Serializer>(
            value: &Option<bool>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&u8::from(*v)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<bool>, D::Error> {
            Ok(Option::<Repr>::deserialize(deserializer)?.map(bool::from))
        }
    }
}
