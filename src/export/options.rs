//! Export options as supplied by the caller.

use std::fmt;

use url::form_urlencoded;

/// Field separator of the CSV table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separator(u8);

impl Separator {
    pub const SEMICOLON: Separator = Separator(b';');
    pub const COMMA: Separator = Separator(b',');
    pub const TAB: Separator = Separator(b'\t');

    /// Parse a caller-supplied separator.
    ///
    /// One layer of surrounding quotes is removed, then the names `Tab`,
    /// `Comma` and `Semicolon` are matched case-insensitively. A single
    /// printable ASCII punctuation character is taken literally, except
    /// quotes and the characters that occur in timestamps and numbers
    /// (`-`, `.`, `:`, space, digits, letters). Anything else falls back
    /// to `;`, so data cells never need CSV quoting.
    pub fn parse(input: &str) -> Self {
        let sep = strip_quotes(input);
        if sep.eq_ignore_ascii_case("tab") {
            return Self::TAB;
        }
        if sep.eq_ignore_ascii_case("comma") {
            return Self::COMMA;
        }
        if sep.eq_ignore_ascii_case("semicolon") {
            return Self::SEMICOLON;
        }
        match sep.as_bytes() {
            [byte] if is_literal_separator(*byte) => Separator(*byte),
            _ => Self::SEMICOLON,
        }
    }

    pub fn as_byte(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        char::from(self.0)
    }
}

impl Default for Separator {
    fn default() -> Self {
        Self::SEMICOLON
    }
}

impl fmt::Display for Separator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

fn is_quote(c: char) -> bool {
    matches!(c, '"' | '\'')
}

fn strip_quotes(input: &str) -> &str {
    let mut chars = input.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if first == last && is_quote(first) => {
            &input[first.len_utf8()..input.len() - last.len_utf8()]
        }
        _ => input,
    }
}

fn is_literal_separator(byte: u8) -> bool {
    byte == b'\t'
        || (byte.is_ascii_punctuation() && !matches!(byte, b'"' | b'\'' | b'-' | b'.' | b':'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Data dump, one row per sample (or per joined timestamp).
    #[default]
    Csv,
    /// Metadata listing: column labels, chunk files, plugin IDs.
    Json,
}

/// Settings for one export pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportConfig {
    pub separator: Separator,
    pub join_timestamp: bool,
    pub only_set_tasks: bool,
    /// Adds a `plugin ID` label to the JSON column listing.
    pub include_plugin_id: bool,
    pub format: ExportFormat,
}

impl ExportConfig {
    /// Build a config from URL query parameters.
    ///
    /// Flags count as set when present, whatever their value.
    pub fn from_query(query: &str, format: ExportFormat) -> Self {
        let mut config = Self {
            format,
            ..Self::default()
        };
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "separator" => config.separator = Separator::parse(&value),
                "jointimestamp" => config.join_timestamp = true,
                "onlysettasks" => config.only_set_tasks = true,
                "pluginID" => config.include_plugin_id = true,
                _ => {}
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_ignore_case() {
        for name in ["tab", "TAB", "Tab", "\"Tab\"", "'tab'"] {
            assert_eq!(Separator::parse(name), Separator::TAB, "{name}");
        }
        assert_eq!(Separator::parse("Comma"), Separator::COMMA);
        assert_eq!(Separator::parse("SEMICOLON"), Separator::SEMICOLON);
    }

    #[test]
    fn literal_and_fallback() {
        assert_eq!(Separator::parse(","), Separator::COMMA);
        assert_eq!(Separator::parse("\",\"").as_char(), ',');
        assert_eq!(Separator::parse("|").as_char(), '|');
        assert_eq!(Separator::parse("pipe"), Separator::SEMICOLON);
        assert_eq!(Separator::parse(""), Separator::SEMICOLON);
        assert_eq!(Separator::parse("\""), Separator::SEMICOLON);
        assert_eq!(Separator::parse("\n"), Separator::SEMICOLON);
        assert_eq!(Separator::parse("é"), Separator::SEMICOLON);
        assert_eq!(Separator::parse("\t"), Separator::TAB);
    }

    #[test]
    fn characters_found_in_cells_fall_back() {
        for input in ["-", ".", ":", " ", "0", "7", "x", "E"] {
            assert_eq!(Separator::parse(input), Separator::SEMICOLON, "{input:?}");
        }
        assert_eq!(Separator::parse("#").as_char(), '#');
        assert_eq!(Separator::parse("'/'").as_char(), '/');
    }

    #[test]
    fn query_flags() {
        let config = ExportConfig::from_query(
            "?separator=Tab&jointimestamp&onlysettasks=0",
            ExportFormat::Csv,
        );
        assert_eq!(config.separator, Separator::TAB);
        assert!(config.join_timestamp);
        assert!(config.only_set_tasks);
        assert!(!config.include_plugin_id);

        let config = ExportConfig::from_query("pluginID", ExportFormat::Json);
        assert!(config.include_plugin_id);
        assert_eq!(config.separator, Separator::SEMICOLON);
        assert_eq!(config.format, ExportFormat::Json);
    }

    #[test]
    fn encoded_separator() {
        let config = ExportConfig::from_query("separator=%2C", ExportFormat::Csv);
        assert_eq!(config.separator, Separator::COMMA);
    }
}
