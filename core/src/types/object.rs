use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CdistError, Result};

/// Directory name that marks an object directory and holds its metadata.
pub const OBJECT_MARKER: &str = ".cdist";

// ---------------------------------------------------------------------------
// ObjectName
// ---------------------------------------------------------------------------

/// Canonical `type_name/object_id` identity of an object.
///
/// The object id may itself contain slashes (`__file/etc/motd`); the type
/// name is everything before the first one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectName {
    type_name: String,
    object_id: String,
}

impl ObjectName {
    pub fn new(type_name: &str, object_id: &str) -> Result<Self> {
        let name = ObjectName {
            type_name: type_name.to_string(),
            object_id: object_id.trim_start_matches('/').to_string(),
        };
        name.validate()?;
        Ok(name)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| CdistError::InvalidObjectName {
            name: format!("{}/{}", self.type_name, self.object_id),
            reason: reason.to_string(),
        };
        if self.type_name.is_empty() || self.type_name.contains('/') {
            return Err(invalid("type name must be a single non-empty component"));
        }
        if self.object_id.is_empty() {
            return Err(invalid("object id is empty"));
        }
        for part in self.object_id.split('/') {
            match part {
                "" => return Err(invalid("object id contains an empty path component")),
                "." | ".." => return Err(invalid("object id contains a relative component")),
                OBJECT_MARKER => return Err(invalid("object id contains the metadata marker")),
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_name, self.object_id)
    }
}

impl FromStr for ObjectName {
    type Err = CdistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((type_name, object_id)) => ObjectName::new(type_name, object_id),
            None => Err(CdistError::InvalidObjectName {
                name: s.to_string(),
                reason: "expected type_name/object_id".into(),
            }),
        }
    }
}

impl TryFrom<String> for ObjectName {
    type Error = CdistError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ObjectName> for String {
    fn from(name: ObjectName) -> String {
        name.to_string()
    }
}

// ---------------------------------------------------------------------------
// ObjectState
// ---------------------------------------------------------------------------

/// Per-object lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    #[default]
    Undefined,
    Prepared,
    Done,
}

impl ObjectState {
    /// Whether `next` is the single forward step from `self`.
    pub fn can_advance_to(self, next: ObjectState) -> bool {
        matches!(
            (self, next),
            (ObjectState::Undefined, ObjectState::Prepared) | (ObjectState::Prepared, ObjectState::Done)
        )
    }

    /// On-disk spelling inside `.cdist/state`. `Undefined` has no file.
    pub fn as_marker(self) -> Option<&'static str> {
        match self {
            ObjectState::Undefined => None,
            ObjectState::Prepared => Some("prepared"),
            ObjectState::Done => Some("done"),
        }
    }

    pub fn from_marker(marker: &str) -> Option<ObjectState> {
        match marker.trim() {
            "" => Some(ObjectState::Undefined),
            "prepared" => Some(ObjectState::Prepared),
            "done" => Some(ObjectState::Done),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectState::Undefined => "undefined",
            ObjectState::Prepared => "prepared",
            ObjectState::Done => "done",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// CdistObject
// ---------------------------------------------------------------------------

/// A named instance of a type, plus the mutable run state the scheduler
/// drives forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdistObject {
    pub name: ObjectName,
    pub state: ObjectState,
    /// Declared by the user; must all be done before this object prepares.
    pub requirements: Vec<ObjectName>,
    /// Discovered while preparing (objects this object's manifest created).
    pub autorequire: Vec<ObjectName>,
    pub code_local: bool,
    pub code_remote: bool,
    pub changed: bool,
}

impl CdistObject {
    pub fn new(name: ObjectName, requirements: Vec<ObjectName>) -> Self {
        CdistObject {
            name,
            state: ObjectState::Undefined,
            requirements,
            autorequire: Vec::new(),
            code_local: false,
            code_remote: false,
            changed: false,
        }
    }

    pub fn type_name(&self) -> &str {
        self.name.type_name()
    }

    pub fn object_id(&self) -> &str {
        self.name.object_id()
    }

    pub fn is_done(&self) -> bool {
        self.state == ObjectState::Done
    }
}

impl fmt::Display for CdistObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

/// An object declared by a manifest, not yet registered in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub name: ObjectName,
    #[serde(default)]
    pub requirements: Vec<ObjectName>,
}

impl ObjectSpec {
    pub fn new(name: ObjectName) -> Self {
        ObjectSpec {
            name,
            requirements: Vec::new(),
        }
    }

    pub fn requiring(mut self, requirement: ObjectName) -> Self {
        self.requirements.push(requirement);
        self
    }
}

/// What one manifest run declared: new objects, and requirements added to
/// objects that already existed (a redeclaration with its own `require`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    pub objects: Vec<ObjectSpec>,
    pub requirement_updates: Vec<ObjectSpec>,
}

impl Declarations {
    pub fn of(objects: Vec<ObjectSpec>) -> Self {
        Declarations {
            objects,
            requirement_updates: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.requirement_updates.is_empty()
    }
}
