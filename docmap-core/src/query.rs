//! Small helpers for building selection criteria from request input.

use bson::{Bson, doc};

/// Builds a case-insensitive substring matcher from free-text input.
///
/// Whitespace-separated terms shorter than three characters are dropped and
/// the rest are escaped, so user input can never inject regex syntax.
/// Returns `None` when no usable term remains.
pub fn match_exact(query: &str) -> Option<bson::Document> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|term| term.chars().count() >= 3)
        .map(regex::escape)
        .collect();
    if terms.is_empty() {
        return None;
    }
    Some(doc! {
        "$regex": format!(".*({}).*", terms.join("|")),
        "$options": "i",
    })
}

/// Collapses a value list into the tightest criterion: a single value stays
/// bare, several become an `$in` clause, none matches nothing.
pub fn maybe_multi(values: Vec<Bson>) -> Bson {
    match values.len() {
        0 => Bson::Document(doc! { "$in": [] }),
        1 => values.into_iter().next().unwrap_or(Bson::Null),
        _ => Bson::Document(doc! { "$in": values }),
    }
}

/// Builds a field projection. Exclusions map to 0, inclusions to 1, and an
/// inclusion of a field wins over its exclusion.
pub fn model_fields<'a>(
    include: impl IntoIterator<Item = &'a str>,
    exclude: impl IntoIterator<Item = &'a str>,
) -> bson::Document {
    let mut projection = bson::Document::new();
    for field in exclude {
        projection.insert(field, 0i32);
    }
    for field in include {
        projection.insert(field, 1i32);
    }
    projection
}

/// Splits a comma-separated field list from request input, trimming blanks.
pub fn split_fields(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_exact_joins_terms_and_escapes() {
        let criteria = match_exact("rust (lang)").unwrap();
        assert_eq!(
            criteria.get_str("$regex").unwrap(),
            r".*(rust|\(lang\)).*"
        );
        assert_eq!(criteria.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn match_exact_drops_short_terms() {
        assert!(match_exact("a bc").is_none());
        assert!(match_exact("   ").is_none());
        let criteria = match_exact("ab longword").unwrap();
        assert_eq!(criteria.get_str("$regex").unwrap(), ".*(longword).*");
    }

    #[test]
    fn maybe_multi_picks_the_tightest_shape() {
        assert_eq!(maybe_multi(vec![Bson::Int64(1)]), Bson::Int64(1));
        assert_eq!(
            maybe_multi(vec![Bson::Int64(1), Bson::Int64(2)]),
            Bson::Document(doc! { "$in": [1i64, 2i64] })
        );
        assert_eq!(
            maybe_multi(Vec::new()),
            Bson::Document(doc! { "$in": [] })
        );
    }

    #[test]
    fn model_fields_lets_inclusion_win() {
        let projection = model_fields(["title"], ["title", "body"]);
        assert_eq!(projection.get_i32("title").unwrap(), 1);
        assert_eq!(projection.get_i32("body").unwrap(), 0);
    }

    #[test]
    fn split_fields_trims_and_skips_blanks() {
        assert_eq!(split_fields("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(split_fields(" , ").is_empty());
    }
}
