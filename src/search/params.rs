//! Typed access to the flat request parameter map.
//!
//! Parameters arrive as untrusted `key=value` strings. Every getter reports
//! whether a value was absent, present but unparsable, or usable, so callers
//! never sprinkle presence checks through their own code. Nothing in here
//! fails: an unparsable value is a [`Param::Invalid`] that the builder treats
//! as absent.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::music::{Pitch, note_to_pitch};

/// Sentinel used by select widgets for "no constraint".
pub const NONE_SENTINEL: &str = "none";

/// Three-way result of reading one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param<T> {
    Absent,
    Invalid(String),
    Present(T),
}

impl<T> Param<T> {
    /// Collapse to `Option`, logging invalid input at debug level.
    pub fn ok(self, key: &str) -> Option<T> {
        match self {
            Param::Present(v) => Some(v),
            Param::Invalid(raw) => {
                tracing::debug!(param = key, value = %raw, "ignoring malformed parameter");
                None
            }
            Param::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Param::Present(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Param<U> {
        match self {
            Param::Present(v) => Param::Present(f(v)),
            Param::Invalid(raw) => Param::Invalid(raw),
            Param::Absent => Param::Absent,
        }
    }
}

/// An inclusive range; either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds<T> {
    pub from: Option<T>,
    pub to: Option<T>,
}

impl<T> Bounds<T> {
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Bounds<U> {
        Bounds {
            from: self.from.map(&mut f),
            to: self.to.map(&mut f),
        }
    }
}

/// The raw parameter map of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParameters {
    values: BTreeMap<String, String>,
}

impl SearchParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an URL query string (`a=1&b=x+y`). Later duplicates win.
    pub fn from_query_string(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        let mut params = Self::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(decode_component(k), decode_component(v));
        }
        params
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Trimmed, non-blank text.
    pub fn text(&self, key: &str) -> Param<&str> {
        match self.raw(key).map(str::trim) {
            None | Some("") => Param::Absent,
            Some(v) => Param::Present(v),
        }
    }

    /// Like [`text`](Self::text) but the `none` sentinel counts as absent.
    pub fn choice(&self, key: &str) -> Param<&str> {
        match self.text(key) {
            Param::Present(v) if v.eq_ignore_ascii_case(NONE_SENTINEL) => Param::Absent,
            other => other,
        }
    }

    /// Checkbox-style flag. Absent or unrecognised values are off.
    pub fn flag(&self, key: &str) -> bool {
        self.text(key).ok(key).is_some_and(|v| {
            ["on", "true", "1", "yes"]
                .iter()
                .any(|t| v.eq_ignore_ascii_case(t))
        })
    }

    /// Comma-joined list with blank items dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.choice(key) {
            Param::Present(v) => split_list(v),
            _ => Vec::new(),
        }
    }

    pub fn int(&self, key: &str) -> Param<i64> {
        self.parsed(key)
    }

    pub fn float(&self, key: &str) -> Param<f64> {
        match self.parsed::<f64>(key) {
            Param::Present(v) if !v.is_finite() => Param::Invalid(v.to_string()),
            other => other,
        }
    }

    /// A pitch given either as a MIDI number or as a note name.
    pub fn pitch(&self, key: &str) -> Param<Pitch> {
        match self.text(key) {
            Param::Present(v) => parse_pitch(v)
                .map(Param::Present)
                .unwrap_or_else(|| Param::Invalid(v.to_string())),
            Param::Invalid(raw) => Param::Invalid(raw),
            Param::Absent => Param::Absent,
        }
    }

    /// Read `<name>From`/`<name>To`, falling back to a comma-joined `<name>`.
    pub fn range<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Bounds<T> {
        let from_key = format!("{name}From");
        let to_key = format!("{name}To");
        let (mut joined_from, mut joined_to) = (Param::Absent, Param::Absent);
        if let Param::Present(joined) = self.text(name) {
            let (a, b) = joined.split_once(',').unwrap_or((joined, ""));
            joined_from = bound(a, &parse);
            joined_to = bound(b, &parse);
        }
        let from = match self.text(&from_key) {
            Param::Present(v) => bound(v, &parse),
            _ => joined_from,
        };
        let to = match self.text(&to_key) {
            Param::Present(v) => bound(v, &parse),
            _ => joined_to,
        };
        Bounds {
            from: from.ok(&from_key),
            to: to.ok(&to_key),
        }
    }

    /// A range that only applies when its `use<Name>` flag is on.
    pub fn gated_range<T>(
        &self,
        flag: &str,
        name: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<Bounds<T>> {
        if !self.flag(flag) {
            return None;
        }
        Some(self.range(name, parse)).filter(|b| !b.is_unbounded())
    }

    /// 1-based page number, clamped to at least 1.
    pub fn page(&self) -> usize {
        match self.int("page").ok("page") {
            Some(p) if p >= 1 => usize::try_from(p).unwrap_or(usize::MAX),
            _ => 1,
        }
    }

    /// Page size clamped to `1..=max`, `default` when missing or invalid.
    pub fn page_size(&self, default: usize, max: usize) -> usize {
        let max = max.max(1);
        match self.int("pageSize").ok("pageSize") {
            Some(s) if s >= 1 => usize::try_from(s).unwrap_or(max).min(max),
            _ => default.clamp(1, max),
        }
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Param<T> {
        match self.text(key) {
            Param::Present(v) => v
                .parse()
                .map(Param::Present)
                .unwrap_or_else(|_| Param::Invalid(v.to_string())),
            Param::Invalid(raw) => Param::Invalid(raw),
            Param::Absent => Param::Absent,
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SearchParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

fn bound<T>(raw: &str, parse: &impl Fn(&str) -> Option<T>) -> Param<T> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Param::Absent;
    }
    parse(raw)
        .map(Param::Present)
        .unwrap_or_else(|| Param::Invalid(raw.to_string()))
}

/// Integer bound parser for [`SearchParameters::range`].
pub fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Finite float bound parser for [`SearchParameters::range`].
pub fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Pitch bound parser: MIDI number first, note name second.
pub fn parse_pitch(raw: &str) -> Option<Pitch> {
    let raw = raw.trim();
    match raw.parse::<i64>() {
        Ok(n) => Pitch::new(n).ok(),
        Err(_) => note_to_pitch(raw).ok(),
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
