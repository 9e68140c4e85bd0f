use crate::engine::Engine;
use crate::types::DbRef;
use bson::Bson;

use super::types::MAX_INCLUDE_DEPTH;

/// Replaces every reference found at `path` inside `row` with the document it
/// points to. Arrays along the way are traversed element by element; a
/// reference whose target no longer exists becomes `Null`.
pub(crate) fn resolve_path(engine: &Engine, row: &mut Bson, path: &str) {
    let segs: Vec<&str> = path.split('.').take(MAX_INCLUDE_DEPTH).collect();
    resolve_at(engine, row, &segs);
}

fn resolve_at(engine: &Engine, value: &mut Bson, segs: &[&str]) {
    let Some((head, rest)) = segs.split_first() else {
        resolve_value(engine, value);
        return;
    };
    match value {
        Bson::Document(d) => {
            if let Some(child) = d.get_mut(*head) {
                resolve_at(engine, child, rest);
            }
        }
        Bson::Array(items) => {
            for item in items {
                resolve_at(engine, item, segs);
            }
        }
        _ => {}
    }
}

fn resolve_value(engine: &Engine, value: &mut Bson) {
    if let Bson::Array(items) = value {
        for item in items {
            resolve_one(engine, item);
        }
    } else {
        resolve_one(engine, value);
    }
}

fn resolve_one(engine: &Engine, value: &mut Bson) {
    let Some(r) = DbRef::from_bson(value) else { return };
    *value = match engine.get_collection(&r.collection).and_then(|c| c.find_document(&r.id)) {
        Some(doc) => doc.to_bson(),
        None => {
            log::debug!("include: dangling reference {}/{}", r.collection, r.id);
            Bson::Null
        }
    };
}
