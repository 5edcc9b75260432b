use serde::{Deserialize, Serialize};

/// How a filter keyword's column relates to its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    Approx,
    ColEqual,
    ColApprox,
    ColAbove,
    ColBelow,
    ColRegexp,
}

impl Relation {
    /// Maps the single-character operators the filter grammar recognizes at the
    /// column/value boundary. Anything outside `=~><:"` defaults to `ColApprox`.
    pub fn from_operator_char(c: char) -> Relation {
        match c {
            '=' => Relation::ColEqual,
            '~' => Relation::ColApprox,
            '>' => Relation::ColAbove,
            '<' => Relation::ColBelow,
            ':' => Relation::ColRegexp,
            _ => Relation::ColApprox,
        }
    }
}

/// The type a keyword's raw value was resolved to during lexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    String,
    Integer,
    Double,
}

/// A single parsed filter term. Exactly one of `int_value`/`double_value` is
/// meaningful, selected by `value_type`; `raw_value` is always retained verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterKeyword {
    pub column: Option<String>,
    pub relation: Relation,
    pub raw_value: String,
    pub value_type: ValueType,
    pub int_value: i64,
    pub double_value: f64,
    pub quoted: bool,
}

impl FilterKeyword {
    pub fn string(column: Option<String>, relation: Relation, raw_value: impl Into<String>, quoted: bool) -> Self {
        let raw_value = raw_value.into();
        Self {
            column,
            relation,
            raw_value,
            value_type: ValueType::String,
            int_value: 0,
            double_value: 0.0,
            quoted,
        }
    }

    pub fn integer(column: Option<String>, relation: Relation, raw_value: impl Into<String>, value: i64) -> Self {
        Self {
            column,
            relation,
            raw_value: raw_value.into(),
            value_type: ValueType::Integer,
            int_value: value,
            double_value: 0.0,
            quoted: false,
        }
    }

    pub fn double(column: Option<String>, relation: Relation, raw_value: impl Into<String>, value: f64) -> Self {
        Self {
            column,
            relation,
            raw_value: raw_value.into(),
            value_type: ValueType::Double,
            int_value: 0,
            double_value: value,
            quoted: false,
        }
    }

    pub fn column_matches(&self, name: &str) -> bool {
        self.column
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(name))
    }
}
