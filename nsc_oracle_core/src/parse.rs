//nsc_oracle_core/parse.rs

//! Total parser for executor output.
//!
//! Language-model output is unreliable: it may be clean JSON, JSON wrapped in
//! prose or code fences, JSON with single quotes and missing separators, or no
//! JSON at all. `ResultParser::parse` walks an ordered list of strategies and
//! returns the first candidate any of them produces. The last resort is a
//! fixed default, so `parse` never fails.

use regex::Regex;
use serde_json::{Map, Value};

use crate::candidate::{OutcomeSchema, ParseStage, ParsedCandidate};
use crate::market::LabelSet;

pub const PRICE_KEY: &str = "price";
pub const FLAG_KEY: &str = "announcement_found";
pub const WINNER_KEY: &str = "winner";

/// A candidate plus the stage that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Parsed {
    pub candidate: ParsedCandidate,
    pub stage: ParseStage,
}

type Strategy = fn(&ResultParser, &str) -> Option<ParsedCandidate>;

/// Tried in order; first hit wins.
const STRATEGIES: [(ParseStage, Strategy); 4] = [
    (ParseStage::Direct, ResultParser::decode_direct),
    (ParseStage::Extracted, ResultParser::decode_extracted),
    (ParseStage::Repaired, ResultParser::decode_repaired),
    (ParseStage::FieldScan, ResultParser::scan_fields),
];

#[derive(Clone, Debug)]
pub struct ResultParser {
    labels: LabelSet,
    schema: OutcomeSchema,
    trailing_sep: Regex,
    missing_sep: Regex,
    price_field: Regex,
    flag_field: Regex,
    /// Built from the escaped labels; `None` only if they exceed the regex size limit.
    winner_field: Option<Regex>,
}

impl ResultParser {
    pub fn new(labels: LabelSet, schema: OutcomeSchema) -> Self {
        let winner_field = winner_pattern(&labels);
        Self {
            labels,
            schema,
            trailing_sep: Regex::new(r",(\s*[}\]])").expect("static pattern"),
            missing_sep: Regex::new(r#"(true|false|null|[0-9]|")(\s+)("[^"\s]+"\s*:)"#)
                .expect("static pattern"),
            price_field: Regex::new(
                r#"(?i)["']?price["']?\s*[:=]\s*["']?\$?\s*([0-9][0-9,]*(?:\.[0-9]+)?)"#,
            )
            .expect("static pattern"),
            flag_field: Regex::new(r#"(?i)["']?announcement_found["']?\s*[:=]\s*["']?(true|false)"#)
                .expect("static pattern"),
            winner_field,
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn schema(&self) -> OutcomeSchema {
        self.schema
    }

    /// Parse one raw output. Never fails; deterministic for a given input.
    pub fn parse(&self, raw: &str) -> Parsed {
        let text = strip_fences(raw);
        for (stage, strategy) in STRATEGIES {
            if let Some(candidate) = strategy(self, text) {
                tracing::debug!(?stage, "executor output parsed");
                return Parsed { candidate: self.finalize(candidate), stage };
            }
        }
        tracing::warn!(
            raw_len = raw.len(),
            default_winner = %self.labels.side_a,
            "executor output unreadable; using default candidate"
        );
        Parsed { candidate: self.default_candidate(), stage: ParseStage::Default }
    }

    /// Byte input is decoded lossily, then parsed as text.
    pub fn parse_bytes(&self, raw: &[u8]) -> Parsed {
        self.parse(&String::from_utf8_lossy(raw))
    }

    /// Conservative fallback: flag false, winner side A.
    pub fn default_candidate(&self) -> ParsedCandidate {
        self.finalize(ParsedCandidate::default())
    }

    fn decode_direct(&self, text: &str) -> Option<ParsedCandidate> {
        let value = serde_json::from_str::<Value>(text).ok()?;
        self.candidate_from_value(value)
    }

    fn decode_extracted(&self, text: &str) -> Option<ParsedCandidate> {
        let object = first_balanced_object(text)?;
        self.decode_direct(object)
    }

    fn decode_repaired(&self, text: &str) -> Option<ParsedCandidate> {
        let source = first_balanced_object(text).unwrap_or(text);
        let repaired = self.repair(source);
        self.decode_direct(&repaired)
            .or_else(|| self.decode_extracted(&repaired))
    }

    fn repair(&self, text: &str) -> String {
        let quoted = text.replace('\'', "\"");
        let separated = self.missing_sep.replace_all(&quoted, "$1,$2$3");
        self.trailing_sep.replace_all(&separated, "$1").into_owned()
    }

    fn scan_fields(&self, text: &str) -> Option<ParsedCandidate> {
        let mut c = ParsedCandidate::default();

        if self.schema.has_price() {
            c.price = self
                .price_field
                .captures(text)
                .and_then(|caps| parse_price_text(&caps[1]))
                .or_else(|| parse_price_text(text));
        }
        if self.schema.has_flag() {
            c.flag = self
                .flag_field
                .captures(text)
                .map(|caps| caps[1].eq_ignore_ascii_case("true"));
        }
        // Kept as written: `finalize` applies the same exact-label rule as the JSON stages.
        c.winner = self.winner_field.as_ref().and_then(|re| {
            re.captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .find(|m| ends_at_boundary(text, m.end()))
                .map(|m| m.as_str().to_owned())
        });

        if c.is_empty() { None } else { Some(c) }
    }

    fn candidate_from_value(&self, value: Value) -> Option<ParsedCandidate> {
        match value {
            Value::Object(map) => self.candidate_from_map(&map),
            Value::Number(n) if self.schema.has_price() => {
                let price = n.as_f64().filter(|p| p.is_finite() && *p >= 0.0)?;
                Some(ParsedCandidate { price: Some(price), ..Default::default() })
            }
            Value::String(s) if self.schema.has_price() => {
                let price = parse_price_text(&s)?;
                Some(ParsedCandidate { price: Some(price), ..Default::default() })
            }
            _ => None,
        }
    }

    /// An object counts only if it carries at least one recognised key.
    fn candidate_from_map(&self, map: &Map<String, Value>) -> Option<ParsedCandidate> {
        if ![PRICE_KEY, FLAG_KEY, WINNER_KEY].iter().any(|k| map.contains_key(*k)) {
            return None;
        }
        Some(ParsedCandidate {
            price: map.get(PRICE_KEY).and_then(price_from_value),
            flag: map.get(FLAG_KEY).and_then(flag_from_value),
            winner: map.get(WINNER_KEY).and_then(Value::as_str).map(str::to_owned),
        })
    }

    /// Drop fields the schema does not carry, fill the ones it does, and pin
    /// the winner to the closed label set.
    fn finalize(&self, mut c: ParsedCandidate) -> ParsedCandidate {
        if !self.schema.has_price() {
            c.price = None;
        }
        c.flag = if self.schema.has_flag() { Some(c.flag.unwrap_or(false)) } else { None };
        c.winner = match c.winner {
            Some(w) if self.labels.contains(&w) => Some(w),
            Some(w) => {
                tracing::debug!(winner = %w, "winner outside label set; using side A");
                Some(self.labels.side_a.clone())
            }
            None => Some(self.labels.side_a.clone()),
        };
        c
    }
}

/// `winner: <label>` for either label, case-insensitive, longest label tried first.
fn winner_pattern(labels: &LabelSet) -> Option<Regex> {
    let mut alts = [labels.side_a.as_str(), labels.side_b.as_str()];
    alts.sort_by_key(|l| std::cmp::Reverse(l.len()));
    let pattern = format!(
        r#"(?i)["']?winner["']?\s*[:=]\s*["']?({}|{})"#,
        regex::escape(alts[0]),
        regex::escape(alts[1])
    );
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "winner pattern rejected; field scan will not read winners");
            None
        }
    }
}

/// A label match must not run into a following word character.
fn ends_at_boundary(text: &str, end: usize) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    match (text[..end].chars().next_back(), text[end..].chars().next()) {
        (Some(prev), Some(next)) => !(is_word(prev) && is_word(next)),
        _ => true,
    }
}

fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// First `{ ... }` slice whose braces balance, ignoring braces inside
/// double-quoted strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_str {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_str = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Accepts `65000.5`, `$65,000.50`, ` 150 `.
fn parse_price_text(s: &str) -> Option<f64> {
    let s = s.trim();
    let s = s.strip_prefix('$').unwrap_or(s);
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
}

fn price_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|p| p.is_finite() && *p >= 0.0),
        Value::String(s) => parse_price_text(s),
        _ => None,
    }
}

fn flag_from_value(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}
