use crate::errors::DbError;
use crate::types::{DocumentId, ID_FIELD, SerializableDateTime, to_bson_document};
use bson::{Bson, Document as BsonDocument};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Metadata {
    pub created_at: SerializableDateTime,
    pub updated_at: SerializableDateTime,
}

impl Metadata {
    pub fn new() -> Self {
        Self { created_at: SerializableDateTime(Utc::now()), updated_at: SerializableDateTime(Utc::now()) }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: BsonDocument,
    pub metadata: Metadata,
}

impl Document {
    /// Wraps `data` under a fresh id. A string `_id` that parses as a
    /// `DocumentId` is adopted instead, so entities can carry their own key.
    pub fn new(mut data: BsonDocument) -> Self {
        let id = match data.remove(ID_FIELD) {
            Some(Bson::String(s)) => DocumentId::parse(&s).unwrap_or_default(),
            _ => DocumentId::new(),
        };
        Self { id, data, metadata: Metadata::new() }
    }

    /// # Errors
    /// Returns an error if `entity` does not serialize to a BSON document.
    pub fn from_entity<T: Serialize + ?Sized>(entity: &T) -> Result<Self, DbError> {
        Ok(Self::new(to_bson_document(entity)?))
    }

    pub fn update(&mut self, new_data: BsonDocument) {
        self.data = new_data;
        self.data.remove(ID_FIELD);
        self.metadata.updated_at = SerializableDateTime(Utc::now());
    }

    /// The document body with its id exposed as `_id`, as queries see it.
    #[must_use]
    pub fn to_bson(&self) -> Bson {
        let mut out = BsonDocument::new();
        out.insert(ID_FIELD, self.id.to_string());
        for (k, v) in &self.data {
            out.insert(k.clone(), v.clone());
        }
        Bson::Document(out)
    }
}
