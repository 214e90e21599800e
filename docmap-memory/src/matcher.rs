//! Criteria matching and value comparison for in-memory scans.

use bson::{Bson, oid::ObjectId};
use regex::RegexBuilder;
use std::cmp::Ordering;

/// Type-erased, orderable view of a BSON value.
///
/// Numeric types normalize to f64 so criteria written with one integer
/// width match records stored with another.
#[derive(Debug)]
enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    String(&'a str),
    DateTime(bson::DateTime),
    Id(&'a ObjectId),
    Array(&'a [Bson]),
    Other,
}

impl<'a> Comparable<'a> {
    fn of(value: &'a Bson) -> Self {
        match value {
            Bson::Null => Comparable::Null,
            Bson::Boolean(flag) => Comparable::Bool(*flag),
            Bson::Int32(n) => Comparable::Number(*n as f64),
            Bson::Int64(n) => Comparable::Number(*n as f64),
            Bson::Double(n) => Comparable::Number(*n),
            Bson::String(text) => Comparable::String(text),
            Bson::DateTime(stamp) => Comparable::DateTime(*stamp),
            Bson::ObjectId(oid) => Comparable::Id(oid),
            Bson::Array(items) => Comparable::Array(items),
            _ => Comparable::Other,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::DateTime(_) => 4,
            Comparable::Id(_) => 5,
            Comparable::Array(_) => 6,
            Comparable::Other => 7,
        }
    }
}

/// Totally orders two BSON values, ranking across types so sorts are stable
/// even over mixed columns.
pub(crate) fn compare(a: &Bson, b: &Bson) -> Ordering {
    let (a, b) = (Comparable::of(a), Comparable::of(b));
    match (&a, &b) {
        (Comparable::Bool(x), Comparable::Bool(y)) => x.cmp(y),
        (Comparable::Number(x), Comparable::Number(y)) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (Comparable::String(x), Comparable::String(y)) => x.cmp(y),
        (Comparable::DateTime(x), Comparable::DateTime(y)) => x.cmp(y),
        (Comparable::Id(x), Comparable::Id(y)) => x.bytes().cmp(&y.bytes()),
        (Comparable::Array(x), Comparable::Array(y)) => {
            for (item_a, item_b) in x.iter().zip(y.iter()) {
                let ord = compare(item_a, item_b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => a.rank().cmp(&b.rank()),
    }
}

/// Whether `record` satisfies every criterion in `criteria`.
///
/// Supports direct equality plus the `$in`, `$ne`, `$gt`, `$gte`, `$lt`,
/// `$lte`, `$exists`, and `$regex` operators. A missing field reads as null.
pub(crate) fn matches(record: &bson::Document, criteria: &bson::Document) -> bool {
    criteria.iter().all(|(key, condition)| {
        let value = record.get(key).unwrap_or(&Bson::Null);
        matches_condition(value, condition)
    })
}

fn matches_condition(value: &Bson, condition: &Bson) -> bool {
    match condition {
        Bson::Document(ops) if ops.keys().any(|key| key.starts_with('$')) => {
            ops.iter().all(|(op, operand)| matches_operator(value, op, operand, ops))
        }
        other => compare(value, other) == Ordering::Equal,
    }
}

fn matches_operator(value: &Bson, op: &str, operand: &Bson, ops: &bson::Document) -> bool {
    match (op, operand) {
        ("$in", Bson::Array(options)) => {
            options.iter().any(|option| compare(value, option) == Ordering::Equal)
        }
        ("$ne", other) => compare(value, other) != Ordering::Equal,
        ("$gt", other) => compare(value, other) == Ordering::Greater,
        ("$gte", other) => compare(value, other) != Ordering::Less,
        ("$lt", other) => compare(value, other) == Ordering::Less,
        ("$lte", other) => compare(value, other) != Ordering::Greater,
        ("$exists", Bson::Boolean(wanted)) => (*value != Bson::Null) == *wanted,
        ("$regex", Bson::String(pattern)) => {
            let Bson::String(text) = value else { return false };
            let insensitive = matches!(ops.get("$options"), Some(Bson::String(o)) if o.contains('i'));
            RegexBuilder::new(pattern)
                .case_insensitive(insensitive)
                .build()
                .map(|regex| regex.is_match(text))
                .unwrap_or(false)
        }
        // Sibling of $regex, consumed above.
        ("$options", _) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn equality_spans_numeric_widths() {
        let record = doc! { "views": 3i64 };
        assert!(matches(&record, &doc! { "views": 3i32 }));
        assert!(matches(&record, &doc! { "views": 3.0f64 }));
        assert!(!matches(&record, &doc! { "views": 4i64 }));
    }

    #[test]
    fn missing_fields_read_as_null() {
        let record = doc! { "title": "a" };
        assert!(matches(&record, &doc! { "views": Bson::Null }));
        assert!(matches(&record, &doc! { "views": { "$exists": false } }));
        assert!(matches(&record, &doc! { "title": { "$exists": true } }));
    }

    #[test]
    fn comparison_operators_apply() {
        let record = doc! { "views": 10i64 };
        assert!(matches(&record, &doc! { "views": { "$gt": 5i32 } }));
        assert!(matches(&record, &doc! { "views": { "$gte": 10i32, "$lte": 10i32 } }));
        assert!(!matches(&record, &doc! { "views": { "$lt": 10i32 } }));
        assert!(matches(&record, &doc! { "views": { "$ne": 11i32 } }));
    }

    #[test]
    fn in_operator_matches_any_option() {
        let record = doc! { "status": "draft" };
        assert!(matches(&record, &doc! { "status": { "$in": ["draft", "final"] } }));
        assert!(!matches(&record, &doc! { "status": { "$in": ["final"] } }));
    }

    #[test]
    fn regex_honors_case_option() {
        let record = doc! { "title": "Hello World" };
        assert!(matches(&record, &doc! { "title": { "$regex": ".*(world).*", "$options": "i" } }));
        assert!(!matches(&record, &doc! { "title": { "$regex": ".*(world).*" } }));
    }

    #[test]
    fn mixed_types_order_by_rank() {
        assert_eq!(compare(&Bson::Null, &Bson::Int64(1)), Ordering::Less);
        assert_eq!(
            compare(&Bson::String("a".into()), &Bson::Int64(1)),
            Ordering::Greater
        );
    }
}
