use scan_model::Relation;

use crate::error::{Result, ScanError};

/// A keyword as it comes out of lexing, before value typing has run.
#[derive(Debug, Clone, PartialEq)]
pub struct RawKeyword {
    pub column: Option<String>,
    pub relation: Relation,
    pub raw_value: String,
    pub quoted: bool,
}

/// Columns whose keyword is unique across a filter sequence. `sort` and
/// `sort-reverse` share a slot: whichever is seen first wins.
const UNIQUE_COLUMNS: &[&str] = &[
    "sort",
    "sort-reverse",
    "first",
    "rows",
    "apply_overrides",
    "delta_states",
    "levels",
    "min_qod",
    "notes",
    "overrides",
    "result_hosts_only",
    "timezone",
];

fn unique_slot(column: &str) -> Option<&'static str> {
    let lower = column.to_ascii_lowercase();
    if lower == "sort" || lower == "sort-reverse" {
        return Some("sort");
    }
    UNIQUE_COLUMNS
        .iter()
        .find(|c| lower == **c)
        .copied()
}

#[derive(Default)]
struct TokenBuilder {
    prefix: String,
    suffix: String,
    relation: Option<Relation>,
    quoted: bool,
    in_quote: bool,
    touched: bool,
}

impl TokenBuilder {
    fn is_empty(&self) -> bool {
        !self.touched
    }

    fn push_operator(&mut self, c: char) {
        self.touched = true;
        match self.relation {
            // `=value` / `~value` with an empty prefix is the unprefixed exact/approx
            // keyword form; any other operator position closes the column portion.
            None => self.relation = Some(Relation::from_operator_char(c)),
            // Relation already fixed: this character is literal value content.
            Some(_) => self.suffix.push(c),
        }
    }

    fn push_quote(&mut self) {
        self.touched = true;
        self.quoted = true;
        self.in_quote = !self.in_quote;
    }

    fn push_char(&mut self, c: char) {
        self.touched = true;
        if self.relation.is_none() {
            self.prefix.push(c);
        } else {
            self.suffix.push(c);
        }
    }

    fn finish(self) -> Result<Option<RawKeyword>> {
        if self.is_empty() {
            return Ok(None);
        }
        if self.in_quote {
            return Err(ScanError::ParseAssert(
                "unterminated quoted value".to_string(),
            ));
        }
        match self.relation {
            Some(relation) => {
                if self.prefix.is_empty() && self.suffix.is_empty() && !self.quoted {
                    return Err(ScanError::ParseAssert(
                        "column delimiter with no keyword under construction".to_string(),
                    ));
                }
                let column = if self.prefix.is_empty() {
                    None
                } else {
                    Some(self.prefix)
                };
                Ok(Some(RawKeyword {
                    column,
                    relation,
                    raw_value: self.suffix,
                    quoted: self.quoted,
                }))
            }
            None => Ok(Some(RawKeyword {
                column: None,
                relation: Relation::Approx,
                raw_value: self.prefix,
                quoted: self.quoted,
            })),
        }
    }
}

/// Single left-to-right lexing pass over a filter string, with duplicate
/// suppression applied as each keyword is appended.
pub fn lex(input: &str) -> Result<Vec<RawKeyword>> {
    let mut keywords = Vec::new();
    let mut seen_slots: Vec<&'static str> = Vec::new();
    let mut builder = TokenBuilder::default();

    let mut flush = |builder: &mut TokenBuilder, keywords: &mut Vec<RawKeyword>, seen_slots: &mut Vec<&'static str>| -> Result<()> {
        let taken = std::mem::take(builder);
        if let Some(keyword) = taken.finish()? {
            let should_drop = keyword
                .column
                .as_deref()
                .and_then(unique_slot)
                .map(|slot| {
                    if seen_slots.contains(&slot) {
                        true
                    } else {
                        seen_slots.push(slot);
                        false
                    }
                })
                .unwrap_or(false);
            if !should_drop {
                keywords.push(keyword);
            }
        }
        Ok(())
    };

    for c in input.chars() {
        if builder.in_quote {
            if c == '"' {
                builder.push_quote();
            } else {
                builder.push_char(c);
            }
            continue;
        }

        match c {
            ' ' | '\t' | '\n' | '\r' => {
                flush(&mut builder, &mut keywords, &mut seen_slots)?;
            }
            '"' => builder.push_quote(),
            '=' | '~' | '>' | '<' | ':' => builder.push_operator(c),
            other => builder.push_char(other),
        }
    }
    flush(&mut builder, &mut keywords, &mut seen_slots)?;

    Ok(keywords)
}
