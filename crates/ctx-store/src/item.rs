// item.rs — The item model: what the store persists and queries.
//
// Every stored document is an `Item`: a type name, an id and a JSON body.
// Typed entities (profiles, sessions, events, and the goal and rule records
// of other crates) convert to and from items through the `ItemType` trait.
// The body never carries the id; `field("itemId")` reads it from the item.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StoreError;

const ITEM_ID_FIELD: &str = "itemId";
const ITEM_TYPE_FIELD: &str = "itemType";

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item_id: String,
    pub item_type: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Item {
    pub fn new(item_type: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            item_type: item_type.into(),
            body: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(name.into(), value.into());
        self
    }

    /// Convert a typed entity into an item.
    pub fn from_entity<T: ItemType>(entity: &T) -> Result<Self, StoreError> {
        let mut body = match serde_json::to_value(entity)? {
            Value::Object(body) => body,
            other => {
                return Err(StoreError::Serialization(serde::de::Error::custom(format!(
                    "{} entity is not a JSON object: {}",
                    T::ITEM_TYPE,
                    other
                ))))
            }
        };
        body.remove(ITEM_ID_FIELD);
        body.remove(ITEM_TYPE_FIELD);
        Ok(Self {
            item_id: entity.item_id().to_string(),
            item_type: T::ITEM_TYPE.to_string(),
            body,
        })
    }

    /// Convert this item back into a typed entity.
    pub fn to_entity<T: ItemType>(&self) -> Result<T, StoreError> {
        if self.item_type != T::ITEM_TYPE {
            return Err(StoreError::WrongItemType {
                expected: T::ITEM_TYPE.to_string(),
                found: self.item_type.clone(),
            });
        }
        let mut body = self.body.clone();
        body.insert(ITEM_ID_FIELD.to_string(), Value::String(self.item_id.clone()));
        Ok(serde_json::from_value(Value::Object(body))?)
    }

    /// Look up a dotted field path such as `properties.age`.
    ///
    /// Object keys may themselves contain dots (goal progress is stored as
    /// `properties["<goal>.start.reached"]`), so at each level the longest
    /// matching key wins.
    pub fn field(&self, path: &str) -> Option<&Value> {
        match path {
            ITEM_ID_FIELD | ITEM_TYPE_FIELD => None,
            _ => {
                let segments: Vec<&str> = path.split('.').collect();
                lookup(&self.body, &segments)
            }
        }
    }

    /// Like [`Item::field`], but also resolves `itemId` and `itemType`.
    pub fn field_value(&self, path: &str) -> Option<Value> {
        match path {
            ITEM_ID_FIELD => Some(Value::String(self.item_id.clone())),
            ITEM_TYPE_FIELD => Some(Value::String(self.item_type.clone())),
            _ => self.field(path).cloned(),
        }
    }
}

fn lookup<'a>(object: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    for end in (1..=segments.len()).rev() {
        let key = segments[..end].join(".");
        if let Some(value) = object.get(&key) {
            if end == segments.len() {
                return Some(value);
            }
            if let Some(nested) = value.as_object().and_then(|o| lookup(o, &segments[end..])) {
                return Some(nested);
            }
        }
    }
    None
}

/// A typed entity stored as an [`Item`].
pub trait ItemType: Serialize + DeserializeOwned {
    /// Item type name used by the store.
    const ITEM_TYPE: &'static str;

    fn item_id(&self) -> &str;
}

/// A visitor profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub item_id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub segments: BTreeSet<String>,
}

impl Profile {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            properties: Map::new(),
            segments: BTreeSet::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl ItemType for Profile {
    const ITEM_TYPE: &'static str = "profile";

    fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// A visit: a sequence of events by one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub item_id: String,
    pub profile_id: String,
    pub time_stamp: DateTime<Utc>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Session {
    pub fn new(item_id: impl Into<String>, profile_id: impl Into<String>, time_stamp: DateTime<Utc>) -> Self {
        Self {
            item_id: item_id.into(),
            profile_id: profile_id.into(),
            time_stamp,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl ItemType for Session {
    const ITEM_TYPE: &'static str = "session";

    fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// A timestamped occurrence within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub item_id: String,
    pub event_type: String,
    pub session_id: String,
    pub profile_id: String,
    pub time_stamp: DateTime<Utc>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Event {
    /// A new event with a random id.
    pub fn new(event_type: impl Into<String>, session: &Session, time_stamp: DateTime<Utc>) -> Self {
        Self {
            item_id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            session_id: session.item_id.clone(),
            profile_id: session.profile_id.clone(),
            time_stamp,
            properties: Map::new(),
        }
    }

    pub fn with_id(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = item_id.into();
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl ItemType for Event {
    const ITEM_TYPE: &'static str = "event";

    fn item_id(&self) -> &str {
        &self.item_id
    }
}
