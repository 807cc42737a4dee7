// ---------------------------------------------------------------------------
// Header – ordered keyword/value cards of one HDU
// ---------------------------------------------------------------------------

pub const CARD_LEN: usize = 80;
pub const BLOCK_LEN: usize = 2880;

/// Ordered keyword → value pairs taken from one record group's header.
///
/// Card order is preserved because the filter compiler emits its selection in
/// header-scan order. String values are stored without quotes and trailing
/// blanks; numeric and logical values are stored as written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<(String, String)>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a header from already-parsed pairs (mostly for tests).
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Header {
            cards: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, keyword: impl Into<String>, value: impl Into<String>) {
        self.cards.push((keyword.into(), value.into()));
    }

    /// First value recorded for `keyword`.
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.cards
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_int(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(|v| v.trim().parse().ok())
    }

    pub fn get_float(&self, keyword: &str) -> Option<f64> {
        // FITS allows a 'D' exponent marker.
        self.get(keyword)
            .and_then(|v| v.trim().replace(['D', 'd'], "E").parse().ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Map a unit keyword to the keyword holding the column name
/// (`TUNIT3` → `TTYPE3`). Keywords without `TUNIT` are returned unchanged.
pub fn name_keyword_for(unit_keyword: &str) -> String {
    unit_keyword.replace("TUNIT", "TTYPE")
}

// ---------------------------------------------------------------------------
// Card codec
// ---------------------------------------------------------------------------

/// Outcome of decoding one 80-byte card.
#[derive(Debug, PartialEq)]
pub enum Card {
    End,
    /// Commentary or blank card carrying no value.
    Commentary,
    Value(String, String),
}

/// Decode one card. `None` when `raw` is not exactly [`CARD_LEN`] bytes.
pub fn parse_card(raw: &[u8]) -> Option<Card> {
    if raw.len() != CARD_LEN {
        return None;
    }
    let (keyword, indicator, rest) = (&raw[..8], &raw[8..10], &raw[10..]);
    let keyword = String::from_utf8_lossy(keyword).trim_end().to_string();
    if keyword == "END" {
        return Some(Card::End);
    }
    if keyword.is_empty() || indicator != b"= " {
        return Some(Card::Commentary);
    }
    Some(Card::Value(keyword, parse_value(&String::from_utf8_lossy(rest))))
}

fn parse_value(rest: &str) -> String {
    let trimmed = rest.trim_start();
    if let Some(body) = trimmed.strip_prefix('\'') {
        // Quoted string; '' is an escaped quote.
        let mut out = String::new();
        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    out.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        return out.trim_end().to_string();
    }
    match trimmed.find('/') {
        Some(pos) => trimmed[..pos].trim().to_string(),
        None => trimmed.trim().to_string(),
    }
}

/// Value kinds the writer knows how to format.
#[derive(Debug, Clone)]
pub enum CardValue {
    Str(String),
    Int(i64),
    Float(f64),
    Logical(bool),
}

/// Format one fixed-width card. Strings longer than a card are truncated.
pub fn format_card(keyword: &str, value: &CardValue) -> [u8; CARD_LEN] {
    let body = match value {
        CardValue::Str(s) => {
            let escaped = s.replace('\'', "''");
            format!("'{escaped:<8}'")
        }
        CardValue::Int(i) => format!("{i:>20}"),
        CardValue::Float(f) => format!("{:>20}", format_float(*f)),
        CardValue::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
    };
    let line = format!("{keyword:<8}= {body}");
    fixed_card(&line)
}

pub fn end_card() -> [u8; CARD_LEN] {
    fixed_card("END")
}

fn fixed_card(line: &str) -> [u8; CARD_LEN] {
    let mut card = [b' '; CARD_LEN];
    for (slot, byte) in card.iter_mut().zip(line.bytes()) {
        *slot = byte;
    }
    card
}

fn format_float(f: f64) -> String {
    let s = format!("{f:?}");
    if s.contains(['.', 'e', 'E']) || !f.is_finite() {
        s.to_uppercase()
    } else {
        format!("{s}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_keyword_maps_to_type_keyword() {
        assert_eq!(name_keyword_for("TUNIT12"), "TTYPE12");
        assert_eq!(name_keyword_for("BUNIT"), "BUNIT");
    }

    #[test]
    fn parses_string_card_with_comment() {
        let raw = fixed_card("TTYPE1  = 'HV_CAL  '           / label for field   1");
        assert_eq!(
            parse_card(&raw),
            Some(Card::Value("TTYPE1".into(), "HV_CAL".into()))
        );
    }

    #[test]
    fn parses_escaped_quote_and_numbers() {
        let raw = fixed_card("OBSERVER= 'O''Neil'");
        assert_eq!(
            parse_card(&raw),
            Some(Card::Value("OBSERVER".into(), "O'Neil".into()))
        );
        let raw = fixed_card("NAXIS2  =                  128 / rows");
        assert_eq!(parse_card(&raw), Some(Card::Value("NAXIS2".into(), "128".into())));
    }

    #[test]
    fn commentary_and_end_cards() {
        assert_eq!(parse_card(&fixed_card("COMMENT hello")), Some(Card::Commentary));
        assert_eq!(parse_card(&end_card()), Some(Card::End));
    }

    #[test]
    fn cards_must_be_full_width() {
        assert_eq!(parse_card(b"END"), None);
        assert_eq!(parse_card(&[b' '; CARD_LEN + 1]), None);
        // Non-UTF-8 bytes in the keyword field do not shift the layout.
        let mut raw = fixed_card("NAXIS   =                    0");
        raw[6] = 0xff;
        assert!(matches!(parse_card(&raw), Some(Card::Value(_, v)) if v == "0"));
    }

    #[test]
    fn formatted_cards_parse_back() {
        let card = format_card("TUNIT2", &CardValue::Str("VOLT".into()));
        assert_eq!(parse_card(&card), Some(Card::Value("TUNIT2".into(), "VOLT".into())));
        let card = format_card("TSCAL1", &CardValue::Float(2.0));
        let Some(Card::Value(_, v)) = parse_card(&card) else {
            panic!("expected value card");
        };
        let h = Header::from_pairs([("TSCAL1", v)]);
        assert_eq!(h.get_float("TSCAL1"), Some(2.0));
    }

    #[test]
    fn header_preserves_order_and_first_match() {
        let h = Header::from_pairs([("A", "1"), ("B", "2"), ("A", "3")]);
        let keys: Vec<&str> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B", "A"]);
        assert_eq!(h.get_int("A"), Some(1));
    }
}
