//! The filter-term parser: converts a user filter string into an ordered,
//! normalized sequence of typed keywords. Pure, restartable, side-effect free.

mod lexer;
mod typing;

use chrono::Utc;
use scan_model::FilterKeyword;

use crate::error::Result;

pub use typing::{SEVERITY_ERROR, SEVERITY_FALSE_POSITIVE, SEVERITY_LOG};

/// Process-wide parser behavior, passed explicitly rather than read from global
/// state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterParserConfig {
    pub table_order_if_sort_not_specified: bool,
}

fn has_column(keywords: &[FilterKeyword], name: &str) -> bool {
    keywords.iter().any(|k| k.column_matches(name))
}

/// Parses `input` into its normalized keyword sequence, synthesizing the
/// `first`/`rows`/`sort` defaults when they are absent.
pub fn parse(input: &str, config: FilterParserConfig) -> Result<Vec<FilterKeyword>> {
    parse_at(input, config, Utc::now())
}

/// Like [`parse`] but with an injected clock, so time-relative value typing is
/// deterministic in tests.
pub fn parse_at(
    input: &str,
    config: FilterParserConfig,
    now: chrono::DateTime<Utc>,
) -> Result<Vec<FilterKeyword>> {
    let raw_keywords = lexer::lex(input)?;

    let mut keywords: Vec<FilterKeyword> = raw_keywords
        .into_iter()
        .map(|raw| {
            let mut keyword = typing::assign_type(raw, now);
            typing::clamp(&mut keyword);
            keyword
        })
        .collect();

    if !has_column(&keywords, "first") {
        keywords.push(FilterKeyword::integer(
            Some("first".to_string()),
            scan_model::Relation::ColEqual,
            "1",
            1,
        ));
    }
    if !has_column(&keywords, "rows") {
        keywords.push(FilterKeyword::integer(
            Some("rows".to_string()),
            scan_model::Relation::ColEqual,
            "-2",
            -2,
        ));
    }
    let has_sort = has_column(&keywords, "sort") || has_column(&keywords, "sort-reverse");
    if !has_sort && !config.table_order_if_sort_not_specified {
        keywords.push(FilterKeyword::string(
            Some("sort".to_string()),
            scan_model::Relation::ColEqual,
            "name",
            false,
        ));
    }

    Ok(keywords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_model::{Relation, ValueType};

    fn cfg() -> FilterParserConfig {
        FilterParserConfig::default()
    }

    #[test]
    fn empty_input_matches_explicit_defaults() {
        let empty = parse("", cfg()).unwrap();
        let explicit = parse("first=1 rows=-2 sort=name", cfg()).unwrap();
        assert_eq!(empty, explicit);
    }

    #[test]
    fn sort_default_is_suppressed_by_table_order_flag() {
        let keywords = parse(
            "",
            FilterParserConfig {
                table_order_if_sort_not_specified: true,
            },
        )
        .unwrap();
        assert!(!has_column(&keywords, "sort"));
    }

    #[test]
    fn duplicate_unique_columns_keep_the_first() {
        let keywords = parse("first=0 rows=0 min_qod=150 sort=a sort=b", cfg()).unwrap();
        let first = keywords.iter().find(|k| k.column_matches("first")).unwrap();
        assert_eq!(first.int_value, 1);
        let rows = keywords.iter().find(|k| k.column_matches("rows")).unwrap();
        assert_eq!(rows.int_value, 1);
        let min_qod = keywords.iter().find(|k| k.column_matches("min_qod")).unwrap();
        assert_eq!(min_qod.int_value, 100);
        let sort = keywords.iter().find(|k| k.column_matches("sort")).unwrap();
        assert_eq!(sort.raw_value, "a");
        assert_eq!(
            keywords.iter().filter(|k| k.column_matches("sort")).count(),
            1
        );
    }

    #[test]
    fn severity_keywords_substitute_fixed_constants() {
        let keywords = parse("severity=\"Log\"", cfg()).unwrap();
        let severity = keywords.iter().find(|k| k.column_matches("severity")).unwrap();
        assert_eq!(severity.value_type, ValueType::Double);
        assert_eq!(severity.double_value, SEVERITY_LOG);
        assert_eq!(severity.relation, Relation::ColEqual);
    }

    #[test]
    fn unprefixed_equal_and_approx_keywords_have_no_column() {
        let keywords = parse("=exact ~approx", cfg()).unwrap();
        let exact = &keywords[0];
        assert_eq!(exact.column, None);
        assert_eq!(exact.relation, Relation::ColEqual);
        assert_eq!(exact.raw_value, "exact");

        let approx = &keywords[1];
        assert_eq!(approx.column, None);
        assert_eq!(approx.relation, Relation::ColApprox);
        assert_eq!(approx.raw_value, "approx");
    }

    #[test]
    fn bare_word_gets_approx_relation() {
        let keywords = parse("myhost", cfg()).unwrap();
        let bare = &keywords[0];
        assert_eq!(bare.column, None);
        assert_eq!(bare.relation, Relation::Approx);
        assert_eq!(bare.raw_value, "myhost");
    }

    #[test]
    fn quoted_value_may_contain_whitespace() {
        let keywords = parse("name=\"my target\"", cfg()).unwrap();
        let name = keywords.iter().find(|k| k.column_matches("name")).unwrap();
        assert_eq!(name.raw_value, "my target");
        assert!(name.quoted);
    }

    #[test]
    fn unterminated_quote_fails_parse_assert() {
        let err = parse("name=\"unterminated", cfg()).unwrap_err();
        assert!(matches!(err, crate::error::ScanError::ParseAssert(_)));
    }

    #[test]
    fn numeric_looking_sort_and_levels_values_stay_strings() {
        let keywords = parse("sort=3 levels=12 delta_states=7 sort-reverse=9", cfg()).unwrap();
        for column in ["sort", "levels", "delta_states", "sort-reverse"] {
            let keyword = keywords.iter().find(|k| k.column_matches(column)).unwrap();
            assert_eq!(keyword.value_type, ValueType::String, "{column} was re-typed numeric");
            assert_eq!(keyword.relation, Relation::ColEqual);
        }
    }

    #[test]
    fn integer_and_float_values_are_typed() {
        let keywords = parse("port=443 weight=0.5", cfg()).unwrap();
        let port = keywords.iter().find(|k| k.column_matches("port")).unwrap();
        assert_eq!(port.value_type, ValueType::Integer);
        assert_eq!(port.int_value, 443);

        let weight = keywords.iter().find(|k| k.column_matches("weight")).unwrap();
        assert_eq!(weight.value_type, ValueType::Double);
        assert_eq!(weight.double_value, 0.5);
    }
}
