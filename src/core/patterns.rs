//! Ordered keyword tables used by the classifiers.
//!
//! A table is a list of `(category, keywords)` rows. Rows are tested in
//! order and the first row with any keyword present wins, so row order is the
//! priority order. Keywords match case-insensitively on word boundaries.

use regex::Regex;

/// One compiled table row.
#[derive(Clone, Debug)]
struct KeywordRule<C> {
    category: C,
    pattern: Regex,
}

/// First match of a table against a text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordMatch<C> {
    /// Winning category.
    pub category: C,
    /// Distinct keywords of that category found in the text, in order of appearance.
    pub keywords: Vec<String>,
}

/// Ordered category → keyword table.
#[derive(Clone, Debug)]
pub struct KeywordTable<C> {
    rules: Vec<KeywordRule<C>>,
}

impl<C: Copy> KeywordTable<C> {
    /// Compile a table from its rows.
    ///
    /// # Errors
    /// Returns an error if a row produces an invalid regex.
    pub fn new(rows: &[(C, &[&str])]) -> Result<Self, regex::Error> {
        let mut rules = Vec::with_capacity(rows.len());
        for (category, keywords) in rows {
            let alternation = keywords
                .iter()
                .map(|kw| regex::escape(kw))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))?;
            rules.push(KeywordRule {
                category: *category,
                pattern,
            });
        }
        Ok(Self { rules })
    }

    /// Return the first row that matches `text`.
    #[must_use]
    pub fn first_match(&self, text: &str) -> Option<KeywordMatch<C>> {
        self.rules.iter().find_map(|rule| {
            let mut keywords: Vec<String> = Vec::new();
            for found in rule.pattern.find_iter(text) {
                let kw = found.as_str().to_lowercase();
                if !keywords.contains(&kw) {
                    keywords.push(kw);
                }
            }
            if keywords.is_empty() {
                None
            } else {
                Some(KeywordMatch {
                    category: rule.category,
                    keywords,
                })
            }
        })
    }
}

/// Replace filename separators with spaces so word boundaries apply.
#[must_use]
pub fn split_separators(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '_' | '-' | '.' | '/' | '\\' => ' ',
            other => other,
        })
        .collect()
}
