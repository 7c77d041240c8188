//! Frontmatter extraction.
//!
//! Notes carry a flat `key: value` header between two `---` lines:
//!
//! ```text
//! ---
//! date: 2024-01-05T09:30:00+01:00
//! title: "Morning pages"
//! ---
//! Body text
//! ```
//!
//! Parsing never fails. A note without a header, or with an unterminated one,
//! yields an empty mapping and its full text as body.

use std::collections::HashMap;

const DELIMITER: &str = "---";

/// Flat header mapping. Values are trimmed and unquoted, never coerced.
pub type Frontmatter = HashMap<String, String>;

/// Split raw note text into its header mapping and the remaining body.
pub fn parse(text: &str) -> (Frontmatter, &str) {
    let Some(header_start) = strip_delimiter_line(text) else {
        return (Frontmatter::new(), text);
    };

    let mut offset = 0;
    for line in header_start.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == DELIMITER {
            let header = &header_start[..offset];
            let body = header_start[offset + line.len()..].trim_start_matches(['\r', '\n']);
            return (parse_header(header), body);
        }
        offset += line.len();
    }

    (Frontmatter::new(), text)
}

/// Returns the text after an opening delimiter line, if there is one.
fn strip_delimiter_line(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(DELIMITER)?;
    rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))
}

fn parse_header(header: &str) -> Frontmatter {
    header
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Strip one layer of matching surrounding quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
