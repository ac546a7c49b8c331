//! Quantity detection and the Writer's leading-quantity splitter.

use super::vocabulary::is_unit;

const VULGAR_FRACTIONS: &[char] = &[
    '½', '⅓', '⅔', '¼', '¾', '⅕', '⅖', '⅗', '⅘', '⅙', '⅚', '⅛', '⅜', '⅝', '⅞',
];

fn is_numeral(c: char) -> bool {
    c.is_ascii_digit() || VULGAR_FRACTIONS.contains(&c)
}

fn is_numeric_part(c: char) -> bool {
    is_numeral(c) || matches!(c, '.' | '/' | '-' | '–')
}

/// Whether a lowercase token is an amount: `2`, `1.5`, `1/2`, `1-2`, `½`,
/// or an amount glued to a unit such as `180g` or `2tbsp`.
pub fn is_quantity(token: &str) -> bool {
    let split_at = token
        .char_indices()
        .find(|(_, c)| !is_numeric_part(*c))
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    let (number, suffix) = token.split_at(split_at);

    number.chars().any(is_numeral) && (suffix.is_empty() || is_unit(suffix))
}

/// An ingredient line split into its leading amount and the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLine {
    /// Leading quantity text exactly as written, if any.
    pub quantity: Option<String>,
    /// The remainder of the line, trimmed.
    pub name: String,
}

/// Separates a free-text ingredient line into quantity text and name.
pub trait QuantitySplitter: Send + Sync {
    fn split(&self, line: &str) -> SplitLine;
}

/// Takes leading amount tokens plus up to two unit words after them.
///
/// `"2 cups stock"` becomes `("2 cups", "stock")`; a line with no leading
/// amount, or with nothing after it, is all name.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadingQuantitySplitter;

const MAX_UNIT_TOKENS: usize = 2;

impl QuantitySplitter for LeadingQuantitySplitter {
    fn split(&self, line: &str) -> SplitLine {
        let line = line.trim();
        let tokens = tokens_with_offsets(line);

        let mut consumed = 0;
        while consumed < tokens.len() && is_quantity(&bare(tokens[consumed].1)) {
            consumed += 1;
        }

        if consumed > 0 {
            let mut units = 0;
            while units < MAX_UNIT_TOKENS
                && consumed < tokens.len()
                && is_unit(&bare(tokens[consumed].1))
            {
                consumed += 1;
                units += 1;
            }
        }

        if consumed == 0 || consumed == tokens.len() {
            return SplitLine {
                quantity: None,
                name: line.to_string(),
            };
        }

        let (last_start, last_token) = tokens[consumed - 1];
        let quantity_end = last_start + last_token.len();
        SplitLine {
            quantity: Some(line[..quantity_end].to_string()),
            name: line[tokens[consumed].0..].trim().to_string(),
        }
    }
}

/// Lowercases a token and drops surrounding punctuation such as `1,` or `(2)`.
fn bare(token: &str) -> String {
    token
        .trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '(' | ')' | '[' | ']'))
        .to_lowercase()
}

fn tokens_with_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push((s, &text[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push((s, &text[s..]));
    }

    tokens
}
