use super::core::Collection;
use crate::document::Document;
use crate::errors::DbError;
use crate::query::NativeQuery;
use crate::types::DocumentId;
use serde::Serialize;
use std::sync::Arc;

impl Collection {
    pub fn insert_document(&self, document: Document) -> DocumentId {
        let doc_id = document.id.clone();
        let mut store = self.store.write();
        if store.docs.insert(doc_id.clone(), document).is_none() {
            store.order.push(doc_id.clone());
        }
        log::trace!("insert {}/{}", self.name(), doc_id);
        doc_id
    }

    /// Serializes `entity` and stores it.
    ///
    /// # Errors
    /// Returns an error if `entity` does not serialize to a BSON document.
    pub fn insert<T: Serialize + ?Sized>(&self, entity: &T) -> Result<DocumentId, DbError> {
        Ok(self.insert_document(Document::from_entity(entity)?))
    }

    /// # Errors
    /// Stops at the first entity that fails to serialize; earlier ones stay inserted.
    pub fn insert_many<'a, T, I>(&self, entities: I) -> Result<Vec<DocumentId>, DbError>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        entities.into_iter().map(|e| self.insert(e)).collect()
    }

    pub fn find_document(&self, id: &DocumentId) -> Option<Document> {
        self.store.read().docs.get(id).cloned()
    }

    pub fn update_document(&self, id: &DocumentId, new_document: Document) -> bool {
        let mut store = self.store.write();
        match store.docs.get_mut(id) {
            Some(existing) => {
                existing.update(new_document.data);
                true
            }
            None => false,
        }
    }

    pub fn delete_document(&self, id: &DocumentId) -> bool {
        let mut store = self.store.write();
        if store.docs.remove(id).is_some() {
            store.order.retain(|x| x != id);
            true
        } else {
            false
        }
    }

    pub fn get_all_documents(&self) -> Vec<Document> {
        let store = self.store.read();
        store.order.iter().filter_map(|id| store.docs.get(id).cloned()).collect()
    }

    /// Return only the IDs of all documents without cloning each document.
    pub fn list_ids(&self) -> Vec<DocumentId> {
        self.store.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.store.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A fresh native query handle; handles are never shared between executions.
    pub fn query(self: &Arc<Self>) -> NativeQuery {
        NativeQuery::new(Arc::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use crate::document::Document;
    use crate::engine::Engine;
    use bson::doc;

    #[test]
    fn crud_keeps_insertion_order() {
        let e = Engine::new();
        let col = e.create_collection("c");
        let a = col.insert_document(Document::new(doc! {"k": 1}));
        let b = col.insert_document(Document::new(doc! {"k": 2}));
        let c = col.insert_document(Document::new(doc! {"k": 3}));
        assert!(col.delete_document(&b));
        assert!(!col.delete_document(&b));
        assert_eq!(col.list_ids(), vec![a.clone(), c]);
        assert!(col.update_document(&a, Document::new(doc! {"k": 10})));
        assert_eq!(col.find_document(&a).unwrap().data.get_i32("k").unwrap(), 10);
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn typed_insert_serializes_entity() {
        #[derive(serde::Serialize)]
        struct P {
            name: &'static str,
        }
        let e = Engine::new();
        let col = e.create_collection("p");
        let id = col.insert(&P { name: "Tim" }).unwrap();
        assert_eq!(col.find_document(&id).unwrap().data.get_str("name").unwrap(), "Tim");
    }
}
