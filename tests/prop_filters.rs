use proptest::prelude::*;
use nexus_linq::Database;
use nexus_linq::expr::{Expr, field};
use nexus_linq::linq::Queryable;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Row {
    a: i64,
    b: i64,
    s: String,
}

#[derive(Debug, Clone)]
enum Pred {
    AGt(i64),
    BLe(i64),
    ANeB,
    SStarts(String),
    Sum(i64),
}

impl Pred {
    fn expr(&self) -> Expr {
        match self {
            Self::AGt(n) => field("a").gt(*n),
            Self::BLe(n) => field("b").le(*n),
            Self::ANeB => field("a").not_equals(field("b")),
            Self::SStarts(p) => field("s").starts_with(p.as_str()),
            Self::Sum(n) => field("a").add(field("b")).lt(*n),
        }
    }

    fn holds(&self, r: &Row) -> bool {
        match self {
            Self::AGt(n) => r.a > *n,
            Self::BLe(n) => r.b <= *n,
            Self::ANeB => r.a != r.b,
            Self::SStarts(p) => r.s.starts_with(p.as_str()),
            Self::Sum(n) => r.a + r.b < *n,
        }
    }
}

fn pred() -> impl Strategy<Value = Pred> {
    prop_oneof![
        (-20i64..20).prop_map(Pred::AGt),
        (-20i64..20).prop_map(Pred::BLe),
        Just(Pred::ANeB),
        "[ab]{0,2}".prop_map(Pred::SStarts),
        (-40i64..40).prop_map(Pred::Sum),
    ]
}

fn row() -> impl Strategy<Value = Row> {
    (-20i64..20, -20i64..20, "[abc]{0,3}").prop_map(|(a, b, s)| Row { a, b, s })
}

proptest! {
    #[test]
    fn prop_filters_match_in_memory_conjunction(
        rows in proptest::collection::vec(row(), 0..40),
        preds in proptest::collection::vec(pred(), 0..4),
    ) {
        let db = Database::new();
        let col = db.collection("rows");
        for r in &rows {
            col.insert(r).unwrap();
        }
        let mut q: Queryable<Row> = db.queryable("rows");
        for p in &preds {
            q = q.filter(p.expr());
        }
        let expected: Vec<Row> = rows.iter().filter(|r| preds.iter().all(|p| p.holds(r))).cloned().collect();
        prop_assert_eq!(q.to_list().unwrap(), expected.clone());
        prop_assert_eq!(q.count().unwrap(), expected.len());
    }

    #[test]
    fn prop_skip_take_order_is_irrelevant(
        n in 0usize..30,
        skip in 0usize..35,
        take in 0usize..35,
    ) {
        let db = Database::new();
        let col = db.collection("seq");
        for i in 0..n {
            col.insert(&bson::doc! {"i": i64::try_from(i).unwrap()}).unwrap();
        }
        let q: Queryable<bson::Document> = db.queryable("seq");
        let ids = |docs: Vec<bson::Document>| docs.iter().map(|d| d.get_i64("i").unwrap()).collect::<Vec<_>>();
        let a = ids(q.skip(skip).take(take).to_list().unwrap());
        let b = ids(q.take(take).skip(skip).to_list().unwrap());
        let expected: Vec<i64> = (0..n).skip(skip).take(take).map(|i| i64::try_from(i).unwrap()).collect();
        prop_assert_eq!(&a, &expected);
        prop_assert_eq!(&b, &expected);
    }
}
