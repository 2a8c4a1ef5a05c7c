//! Codec for the bookkeeping fields stored on A-side tickets.
//!
//! The fields keep the representation already present on existing tickets:
//!
//! ```text
//! ref_B          I100-17                      ("No" = no counterpart)
//! attach_map     {4711: 'b7c1', 4712: ''}     ("" = unmirrored, "error" = retry)
//! note_map       {88: 'a0f3'}
//! status_mirror  in-progress                  ("No" = never observed)
//! ```
//!
//! Parsing never fails outright: a field that cannot be read comes back as
//! [`ExtField::Malformed`] so the component that needs it can skip the item
//! while the rest of the cycle proceeds.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ModelError;
use crate::types::{IncidentNumber, TicketStatus, MIRROR_ERROR, NO_COUNTERPART};

// ---------------------------------------------------------------------------
// ExtField
// ---------------------------------------------------------------------------

/// A parsed bookkeeping field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtField<T> {
    /// Empty or the `"No"` sentinel.
    Unset,
    Set(T),
    /// Raw value that could not be parsed.
    Malformed(String),
}

impl<T> ExtField<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, ExtField::Unset)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            ExtField::Set(value) => Some(value),
            _ => None,
        }
    }

    /// `Ok(None)` when unset, `Ok(Some)` when set, an extension error when malformed.
    pub fn into_result(self, field: &'static str) -> Result<Option<T>, ModelError> {
        match self {
            ExtField::Unset => Ok(None),
            ExtField::Set(value) => Ok(Some(value)),
            ExtField::Malformed(raw) => Err(ModelError::Extension {
                field,
                raw,
                reason: "unparseable value".to_owned(),
            }),
        }
    }
}

impl<T: Default> ExtField<T> {
    /// Like [`ExtField::into_result`] but an unset field yields `T::default()`.
    pub fn or_default(self, field: &'static str) -> Result<T, ModelError> {
        Ok(self.into_result(field)?.unwrap_or_default())
    }
}

fn is_sentinel(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || trimmed == NO_COUNTERPART
}

// ---------------------------------------------------------------------------
// ref_B
// ---------------------------------------------------------------------------

/// Parse `ref_B`; the sentinel and the empty string both mean "no counterpart".
pub fn parse_ref(raw: &str) -> Option<IncidentNumber> {
    if is_sentinel(raw) {
        None
    } else {
        Some(IncidentNumber::from(raw.trim()))
    }
}

pub fn encode_ref(number: Option<&IncidentNumber>) -> String {
    match number {
        Some(number) => number.0.clone(),
        None => NO_COUNTERPART.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// status_mirror
// ---------------------------------------------------------------------------

pub fn parse_status_mirror(raw: &str) -> ExtField<TicketStatus> {
    if is_sentinel(raw) {
        return ExtField::Unset;
    }
    match raw.parse::<TicketStatus>() {
        Ok(status) => ExtField::Set(status),
        Err(_) => ExtField::Malformed(raw.to_owned()),
    }
}

pub fn encode_status_mirror(status: Option<TicketStatus>) -> String {
    match status {
        Some(status) => status.as_token().to_owned(),
        None => NO_COUNTERPART.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// MirrorMap
// ---------------------------------------------------------------------------

/// State of one entry in `attach_map` / `note_map`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorSlot {
    /// Registered but not copied to the other side yet.
    Pending,
    /// The last copy attempt failed.
    Failed,
    /// Copied; holds the counterpart id on the other side.
    Mirrored(String),
}

impl MirrorSlot {
    fn from_wire(value: &str) -> Self {
        if value.is_empty() {
            MirrorSlot::Pending
        } else if value.starts_with("err") {
            MirrorSlot::Failed
        } else {
            MirrorSlot::Mirrored(value.to_owned())
        }
    }

    fn to_wire(&self) -> &str {
        match self {
            MirrorSlot::Pending => "",
            MirrorSlot::Failed => MIRROR_ERROR,
            MirrorSlot::Mirrored(id) => id,
        }
    }

    pub fn is_mirrored(&self) -> bool {
        matches!(self, MirrorSlot::Mirrored(_))
    }
}

/// Mapping from A-side ids to B-side ids for attachments or notes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MirrorMap {
    entries: BTreeMap<String, MirrorSlot>,
}

impl MirrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&MirrorSlot> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `remote_id` is already recorded as a counterpart.
    pub fn contains_remote(&self, remote_id: &str) -> bool {
        self.entries
            .values()
            .any(|slot| matches!(slot, MirrorSlot::Mirrored(id) if id == remote_id))
    }

    /// Register `key` as pending. Returns `false` if it was already known.
    pub fn register(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, MirrorSlot::Pending);
        true
    }

    pub fn set_mirrored(&mut self, key: impl Into<String>, remote_id: impl Into<String>) {
        self.entries
            .insert(key.into(), MirrorSlot::Mirrored(remote_id.into()));
    }

    pub fn set_failed(&mut self, key: impl Into<String>) {
        self.entries.insert(key.into(), MirrorSlot::Failed);
    }

    /// Keys still waiting to be copied (pending or failed), in key order.
    pub fn unmirrored(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, slot)| !slot.is_mirrored())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MirrorSlot)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse a mapping literal. Empty input and the `"No"` sentinel are unset.
    pub fn parse_field(raw: &str) -> ExtField<MirrorMap> {
        if is_sentinel(raw) {
            return ExtField::Unset;
        }
        match MirrorMap::parse(raw) {
            Ok(map) => ExtField::Set(map),
            Err(_) => ExtField::Malformed(raw.to_owned()),
        }
    }

    /// Parse a mapping literal such as `{12: 'abc', '13': ""}`.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let mut parser = Parser {
            chars: raw.chars().collect(),
            pos: 0,
        };
        parser.parse_map().map_err(|reason| ModelError::Extension {
            field: "mirror map",
            raw: raw.to_owned(),
            reason,
        })
    }

    /// Serialize back to the literal form: integer keys bare, everything else
    /// single-quoted.
    pub fn encode(&self) -> String {
        let body = self
            .entries
            .iter()
            .map(|(key, slot)| {
                let key = if is_integer(key) {
                    key.clone()
                } else {
                    quote(key)
                };
                format!("{key}: {}", quote(slot.to_wire()))
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{{body}}}")
    }
}

impl fmt::Display for MirrorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn is_integer(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

// ---------------------------------------------------------------------------
// Literal parser
// ---------------------------------------------------------------------------

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: char) -> Result<(), String> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(format!("expected '{want}' at {}, found '{c}'", self.pos - 1)),
            None => Err(format!("expected '{want}', found end of input")),
        }
    }

    fn parse_map(&mut self) -> Result<MirrorMap, String> {
        let mut map = MirrorMap::new();
        self.skip_ws();
        self.expect('{')?;
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                break;
            }
            let key = self.parse_scalar()?;
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.parse_scalar()?;
            map.entries.insert(key, MirrorSlot::from_wire(&value));
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => break,
                Some(c) => return Err(format!("unexpected '{c}' at {}", self.pos - 1)),
                None => return Err("unterminated mapping".to_owned()),
            }
        }
        self.skip_ws();
        if self.pos < self.chars.len() {
            return Err(format!("trailing input at {}", self.pos));
        }
        Ok(map)
    }

    fn parse_scalar(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.pos += 1;
                self.parse_quoted(q)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(self.parse_integer()),
            Some(c) => Err(format!("unexpected '{c}' at {}", self.pos)),
            None => Err("unexpected end of input".to_owned()),
        }
    }

    fn parse_quoted(&mut self, quote: char) -> Result<String, String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string".to_owned()),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => return Err("dangling escape".to_owned()),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_integer(&mut self) -> String {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
