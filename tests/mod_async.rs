use nexus_linq::Database;
use nexus_linq::errors::DbError;
use nexus_linq::expr::{Comparer, field};
use nexus_linq::linq::Queryable;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    name: String,
    age: i32,
}

async fn people(db: &Database) -> Queryable<Person> {
    let col = db.async_collection("people");
    let batch: Vec<Person> = [("Thomas", 30), ("Benjamin", 25), ("Thomas", 27), ("Albert", 27), ("Tim", 40)]
        .into_iter()
        .map(|(n, a)| Person { name: n.into(), age: a })
        .collect();
    col.insert_many(&batch, &CancellationToken::new()).await.unwrap();
    db.async_queryable("people")
}

#[tokio::test]
async fn async_scenario_matches_sync_results() {
    let db = Database::new();
    let q = people(&db).await;
    let cancel = CancellationToken::new();
    let t = q.filter(field("name").starts_with("T"));
    assert_eq!(t.count_async(&cancel).await.unwrap(), 3);
    assert_eq!(t.sum_async::<i32>(field("age"), &cancel).await.unwrap(), 97);
    assert_eq!(q.order_by(field("age")).first_async(&cancel).await.unwrap().name, "Benjamin");
    let page = q.skip(2).take(2).to_list_async(&cancel).await.unwrap();
    assert_eq!(page.iter().map(|p| p.age).collect::<Vec<_>>(), vec![27, 27]);
    let name: String =
        q.filter(field("age").equals(40)).select(field("name")).first_async(&cancel).await.unwrap();
    assert_eq!(name, "Tim");
    // sync terminals also work on an async source
    assert_eq!(t.count().unwrap(), 3);
}

#[tokio::test]
async fn async_element_and_count_variants() {
    let db = Database::new();
    let q = people(&db).await;
    let cancel = CancellationToken::new();
    assert!(q.first_or_default_where_async(field("age").gt(90), &cancel).await.unwrap().is_none());
    assert_eq!(q.single_where_async(field("age").equals(25), &cancel).await.unwrap().name, "Benjamin");
    assert!(matches!(q.single_async(&cancel).await, Err(DbError::MoreThanOneElement)));
    assert!(q.single_or_default_where_async(field("age").gt(90), &cancel).await.unwrap().is_none());
    assert_eq!(q.long_count_where_async(field("age").equals(27), &cancel).await.unwrap(), 2);
    assert!(q.any_where_async(field("name").equals("Tim"), &cancel).await.unwrap());
    assert!(q.any_async(&cancel).await.unwrap());
    let arr = q.order_by_descending(field("age")).take(1).to_array_async(&cancel).await.unwrap();
    assert_eq!(arr[0].name, "Tim");
}

#[tokio::test]
async fn async_aggregates_with_comparers() {
    let db = Database::new();
    let q = people(&db).await;
    let cancel = CancellationToken::new();
    assert!((q.average_async::<i32>(field("age"), &cancel).await.unwrap() - 29.8).abs() < 1e-9);
    assert_eq!(q.min_async::<i32>(field("age"), &cancel).await.unwrap(), 25);
    let reversed = Comparer::new(|a, b| nexus_linq::query::compare_bson(b, a));
    assert_eq!(q.max_by_async::<i32>(field("age"), reversed.clone(), &cancel).await.unwrap(), 25);
    assert_eq!(q.min_by_async::<i32>(field("age"), reversed, &cancel).await.unwrap(), 40);
    let ages: Queryable<i32> = q.select(field("age"));
    assert!((ages.average_values_async(&cancel).await.unwrap() - 29.8).abs() < 1e-9);
}

#[tokio::test]
async fn composition_errors_surface_through_the_future() {
    let db = Database::new();
    let q = people(&db).await;
    let err = q
        .order_by(field("age"))
        .then_by(field("name"))
        .to_list_async(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_not_supported());
}

#[tokio::test]
async fn cancellation_is_reported() {
    let db = Database::new();
    let q = people(&db).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(q.to_list_async(&cancel).await, Err(DbError::Cancelled)));
    assert!(matches!(q.sum_async::<i32>(field("age"), &cancel).await, Err(DbError::Cancelled)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_queries_do_not_interfere() {
    let db = Database::new();
    let q = people(&db).await;
    let mut handles = Vec::new();
    for min_age in [20, 26, 28, 35] {
        let q = q.clone();
        handles.push(tokio::spawn(async move {
            q.count_where_async(field("age").gt(min_age), &CancellationToken::new()).await
        }));
    }
    let mut counts = Vec::new();
    for h in handles {
        counts.push(h.await.unwrap().unwrap());
    }
    assert_eq!(counts, vec![5, 4, 2, 1]);
}
