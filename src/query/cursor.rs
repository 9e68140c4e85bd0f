use crate::collection::Collection;
use crate::types::DocumentId;
use bson::Bson;
use std::sync::Arc;

/// Lazy result sequence of a native query.
///
/// Unordered, unfiltered scans keep only ids and fetch each document when it
/// is reached; everything else arrives with the rows already computed.
#[derive(Clone)]
pub struct Cursor {
    pub collection: Arc<Collection>,
    pub ids: Vec<DocumentId>,
    pub pos: usize,
    pub rows: Option<Vec<Bson>>, // when present, iterate these
}

impl Cursor {
    pub(crate) fn over_ids(collection: Arc<Collection>, ids: Vec<DocumentId>) -> Self {
        Self { collection, ids, pos: 0, rows: None }
    }

    pub(crate) fn over_rows(collection: Arc<Collection>, rows: Vec<Bson>) -> Self {
        Self { collection, ids: Vec::new(), pos: 0, rows: Some(rows) }
    }

    pub fn advance(&mut self) -> Option<Bson> {
        if let Some(ref rows) = self.rows {
            let r = rows.get(self.pos).cloned();
            self.pos += 1;
            return r;
        }
        // documents deleted since the scan started are skipped
        while self.pos < self.ids.len() {
            let id = &self.ids[self.pos];
            self.pos += 1;
            if let Some(d) = self.collection.find_document(id) {
                return Some(d.to_bson());
            }
        }
        None
    }

    #[must_use]
    pub fn to_vec(mut self) -> Vec<Bson> {
        if let Some(rows) = self.rows.take() {
            return rows.into_iter().skip(self.pos).collect();
        }
        let mut out = Vec::with_capacity(self.ids.len().saturating_sub(self.pos));
        while let Some(d) = self.advance() {
            out.push(d);
        }
        out
    }
}

impl Iterator for Cursor {
    type Item = Bson;
    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}
