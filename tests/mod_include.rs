use bson::doc;
use nexus_linq::Database;
use nexus_linq::expr::field;
use nexus_linq::linq::Queryable;
use nexus_linq::types::{DbRef, DocumentId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Book {
    title: String,
    author: Option<Author>,
}

#[derive(Debug, Deserialize)]
struct Shelf {
    label: String,
    books: Vec<Option<Author>>,
}

fn library() -> (Database, DocumentId, DocumentId) {
    let db = Database::new();
    let authors = db.collection("authors");
    let herbert = authors.insert(&doc! {"name": "Frank Herbert"}).unwrap();
    let dick = authors.insert(&doc! {"name": "Philip K. Dick"}).unwrap();
    let books = db.collection("books");
    books.insert(&doc! {"title": "Dune", "author": DbRef::new("authors", herbert.clone())}).unwrap();
    books.insert(&doc! {"title": "Ubik", "author": DbRef::new("authors", dick.clone())}).unwrap();
    (db, herbert, dick)
}

#[test]
fn include_loads_single_reference() {
    let (db, _, _) = library();
    let q: Queryable<Book> = db.queryable("books");
    let dune = q.include(field("author")).first_where(field("title").equals("Dune")).unwrap();
    assert_eq!(dune.title, "Dune");
    assert_eq!(dune.author.unwrap().name, "Frank Herbert");
}

#[test]
fn without_include_the_reference_stays_raw() {
    let (db, herbert, _) = library();
    let q: Queryable<bson::Document> = db.queryable("books");
    let dune = q.first_where(field("title").equals("Dune")).unwrap();
    let raw = DbRef::from_bson(dune.get("author").unwrap()).unwrap();
    assert_eq!(raw.id, herbert);
}

#[test]
fn include_resolves_arrays_and_dangling_references() {
    let (db, herbert, dick) = library();
    let shelves = db.collection("shelves");
    let gone = DocumentId::new();
    shelves
        .insert(&doc! {
            "label": "sf",
            "books": [DbRef::new("authors", herbert), DbRef::new("authors", dick), DbRef::new("authors", gone)],
        })
        .unwrap();
    let q: Queryable<Shelf> = db.queryable("shelves");
    let shelf = q.include(field("books")).single().unwrap();
    assert_eq!(shelf.label, "sf");
    let names: Vec<Option<String>> = shelf.books.into_iter().map(|a| a.map(|a| a.name)).collect();
    assert_eq!(names, vec![Some("Frank Herbert".into()), Some("Philip K. Dick".into()), None]);
}

#[test]
fn include_then_project_the_loaded_field() {
    let (db, _, _) = library();
    let q: Queryable<Book> = db.queryable("books");
    let names: Vec<String> =
        q.include(field("author")).order_by(field("title")).select(field("author.name")).to_list().unwrap();
    assert_eq!(names, vec!["Frank Herbert".to_string(), "Philip K. Dick".to_string()]);
    let titles: Vec<String> = q.select(field("title")).to_list().unwrap();
    assert_eq!(titles.len(), 2);
}

#[derive(Debug, Deserialize)]
struct Edition {
    title: String,
    author: Option<Author>,
    publisher: Option<Publisher>,
}

#[derive(Debug, Deserialize)]
struct Publisher {
    house: String,
}

#[test]
fn chained_includes_resolve_every_path() {
    let (db, herbert, _) = library();
    let ace = db.collection("publishers").insert(&doc! {"house": "Ace"}).unwrap();
    db.collection("editions")
        .insert(&doc! {
            "title": "Dune",
            "author": DbRef::new("authors", herbert),
            "publisher": DbRef::new("publishers", ace),
        })
        .unwrap();
    let q: Queryable<Edition> = db.queryable("editions");
    let dune = q.include(field("author")).include(field("publisher")).single().unwrap();
    assert_eq!(dune.title, "Dune");
    assert_eq!(dune.author.unwrap().name, "Frank Herbert");
    assert_eq!(dune.publisher.unwrap().house, "Ace");

    // a single include leaves the other reference raw
    let raw: Queryable<bson::Document> = db.queryable("editions");
    let only_author = raw.include(field("author")).single().unwrap();
    assert_eq!(only_author.get_document("author").unwrap().get_str("name").unwrap(), "Frank Herbert");
    assert!(DbRef::from_bson(only_author.get("publisher").unwrap()).is_some());
}
