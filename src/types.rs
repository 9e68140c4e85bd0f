use crate::errors::DbError;
use bson::{Bson, Document as BsonDocument, doc};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

pub type CollectionName = String;

/// Field holding the document id when a document is handed out as BSON.
pub const ID_FIELD: &str = "_id";
const REF_COLLECTION: &str = "$ref";
const REF_ID: &str = "$id";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses the textual form produced by `Display`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A reference from one document to a document in another collection.
///
/// Stored inline as `{"$ref": <collection>, "$id": <id>}` and resolved by
/// `include` at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbRef {
    pub collection: CollectionName,
    pub id: DocumentId,
}

impl DbRef {
    pub fn new(collection: impl Into<CollectionName>, id: DocumentId) -> Self {
        Self { collection: collection.into(), id }
    }

    #[must_use]
    pub fn to_document(&self) -> BsonDocument {
        doc! { REF_COLLECTION: self.collection.clone(), REF_ID: self.id.to_string() }
    }

    /// Recognizes the inline reference shape; anything else is `None`.
    #[must_use]
    pub fn from_bson(value: &Bson) -> Option<Self> {
        let d = value.as_document()?;
        let collection = d.get(REF_COLLECTION)?.as_str()?;
        let id = DocumentId::parse(d.get(REF_ID)?.as_str()?)?;
        Some(Self::new(collection, id))
    }
}

impl From<DbRef> for Bson {
    fn from(r: DbRef) -> Self {
        Self::Document(r.to_document())
    }
}

impl Serialize for DbRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DbRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let d = BsonDocument::deserialize(deserializer)?;
        Self::from_bson(&Bson::Document(d))
            .ok_or_else(|| serde::de::Error::custom("expected {\"$ref\", \"$id\"} reference"))
    }
}

/// A wrapper for `chrono::DateTime<Utc>` serialized as RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializableDateTime(pub DateTime<Utc>);

impl Serialize for SerializableDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for SerializableDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let dt =
            DateTime::parse_from_rfc3339(&s).map_err(serde::de::Error::custom)?.with_timezone(&Utc);
        Ok(Self(dt))
    }
}

/// # Errors
/// Returns an error if `value` does not serialize to a BSON document.
pub fn to_bson_document<T: Serialize + ?Sized>(value: &T) -> Result<BsonDocument, DbError> {
    Ok(bson::serialize_to_document(value)?)
}

/// # Errors
/// Returns an error if `value` does not have the shape `T` expects.
pub fn from_bson_value<T: DeserializeOwned>(value: Bson) -> Result<T, DbError> {
    Ok(bson::deserialize_from_bson(value)?)
}
