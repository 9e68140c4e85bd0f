use bson::doc;
use nexus_linq::Database;
use nexus_linq::errors::DbError;
use nexus_linq::expr::{Constant, Expr, Method, NumericKind, field, it, lit};
use nexus_linq::linq::{QueryProvider, QuerySource, Queryable};
use tokio_util::sync::CancellationToken;

fn db() -> Database {
    let db = Database::new();
    let col = db.collection("books");
    for (title, pages) in [("Dune", 412), ("Emma", 474), ("Ubik", 202)] {
        col.insert(&doc! {"title": title, "pages": pages}).unwrap();
    }
    db
}

fn not_supported<T: std::fmt::Debug>(r: Result<T, DbError>) -> String {
    match r {
        Err(DbError::NotSupported(msg)) => msg,
        other => panic!("expected not supported, got {other:?}"),
    }
}

#[test]
fn two_primary_orders_fail() {
    let q: Queryable<bson::Document> = db().queryable("books");
    let msg = not_supported(q.order_by(field("title")).order_by(field("pages")).to_list());
    assert_eq!(msg, "multiple order is not supported");
}

#[test]
fn secondary_order_fails() {
    let q: Queryable<bson::Document> = db().queryable("books");
    let msg = not_supported(q.order_by(field("title")).then_by(field("pages")).count());
    assert_eq!(msg, "secondary order is not supported");
    let msg = not_supported(q.order_by(field("title")).then_by_descending(field("pages")).first());
    assert_eq!(msg, "secondary order is not supported");
}

#[test]
fn two_projections_fail() {
    let q: Queryable<bson::Document> = db().queryable("books");
    let twice: Queryable<String> = q.select::<bson::Document>(field("title")).select(field("title"));
    assert_eq!(not_supported(twice.to_list()), "multiple projection is not supported");
}

#[test]
fn unknown_method_fails() {
    let q: Queryable<bson::Document> = db().queryable("books");
    let reversed = q.apply(Method::Named("Reverse".into()), vec![]);
    assert_eq!(not_supported(reversed.to_list()), "method 'Reverse' is not supported");
}

#[test]
fn failed_composition_does_not_poison_later_queries() {
    let q: Queryable<bson::Document> = db().queryable("books");
    assert!(q.order_by(field("a")).order_by(field("b")).count().is_err());
    assert_eq!(q.count().unwrap(), 3);
}

#[test]
fn async_terminal_on_sync_source_fails() {
    let q: Queryable<bson::Document> = db().queryable("books");
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let err = rt.block_on(q.count_async(&CancellationToken::new())).unwrap_err();
    assert!(matches!(err, DbError::InvalidOperation(ref m) if m == "queryable is not async"));
    assert_eq!(q.count().unwrap(), 3);
}

#[test]
fn missing_lambda_in_hand_built_tree_is_argument_null() {
    let db = db();
    let provider = QueryProvider::new(QuerySource::Sync(db.collection("books")));
    let tree = Expr::call(Method::Where, vec![provider.root()]);
    let q: Queryable<bson::Document> = Queryable::from_expr(provider, tree);
    assert!(matches!(q.to_list(), Err(DbError::ArgumentNull("predicate"))));
}

#[test]
fn non_literal_skip_is_rejected() {
    let db = db();
    let provider = QueryProvider::new(QuerySource::Sync(db.collection("books")));
    let tree = Expr::call(Method::Skip, vec![provider.root(), field("pages")]);
    let q: Queryable<bson::Document> = Queryable::from_expr(provider, tree);
    assert!(q.to_list().unwrap_err().is_not_supported());
}

#[test]
fn numeric_aggregate_over_documents_is_a_query_error() {
    let q: Queryable<bson::Document> = db().queryable("books");
    let tree = Expr::call(
        Method::Sum,
        vec![q.expression().clone(), Expr::Constant(Constant::Numeric(NumericKind::Int32))],
    );
    let provider = q.provider().clone();
    assert!(matches!(provider.execute(&tree), Err(DbError::QueryError(_))));
    let pages: i32 = q.sum(field("pages")).unwrap();
    assert_eq!(pages, 1088);
    assert!(q.filter(field("pages").gt(lit(1000))).first_or_default().unwrap().is_none());
}

#[test]
fn operators_after_select_fail_instead_of_seeing_documents() {
    let q: Queryable<bson::Document> = db().queryable("books");
    let pages: Queryable<i32> = q.select(field("pages"));
    assert_eq!(not_supported(pages.count_where(it().gt(300))), "filter after projection is not supported");
    assert_eq!(not_supported(pages.filter(it().gt(300)).to_list()), "filter after projection is not supported");
    assert_eq!(not_supported(pages.order_by(it()).to_list()), "order after projection is not supported");
    let titles: Queryable<String> = q.select(field("title"));
    assert_eq!(not_supported(titles.first_where(it().starts_with("U"))), "filter after projection is not supported");
    assert_eq!(not_supported(titles.any_where(it().equals("Emma"))), "filter after projection is not supported");

    // the same intent composed before the projection works
    let n = q.filter(field("pages").gt(300)).select::<i32>(field("pages")).count().unwrap();
    assert_eq!(n, 2);
    let first: String = q.order_by(field("pages")).select(field("title")).first().unwrap();
    assert_eq!(first, "Ubik");
    // paging and aggregate selectors still compose over projected values
    assert_eq!(pages.skip(1).take(1).to_list().unwrap(), vec![474]);
    assert_eq!(pages.max_value().unwrap(), 474);
}
