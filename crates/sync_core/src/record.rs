use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike, Utc};
use serde_json::{Map, Number, Value};

/// A single typed cell of a warehouse row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Civil date and time without a zone.
    DateTime(NaiveDateTime),
    Array(Vec<FieldValue>),
    Map(Record),
}

impl FieldValue {
    /// Values that cannot serve as a document id: null, `false`, zero, and
    /// empty strings, byte strings, arrays and maps.
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(value) => !value,
            Self::Integer(value) => *value == 0,
            Self::Float(value) => *value == 0.0,
            Self::String(value) => value.is_empty(),
            Self::Bytes(value) => value.is_empty(),
            Self::Timestamp(_) | Self::DateTime(_) => false,
            Self::Array(values) => values.is_empty(),
            Self::Map(record) => record.is_empty(),
        }
    }

    /// Text form used as the input of document id sanitization.
    ///
    /// The forms (`True`, `1e+16`, `2026-02-14 08:30:00+00:00`, `b'..'`,
    /// `['a', 1]`) must stay stable: existing collections were keyed with them.
    pub fn to_id_string(&self) -> String {
        match self {
            Self::String(value) => value.clone(),
            other => other.display_text(),
        }
    }

    fn display_text(&self) -> String {
        match self {
            Self::Null => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => float_text(*value),
            Self::String(value) => quoted_text(value),
            Self::Bytes(value) => quoted_bytes(value),
            Self::Timestamp(value) => format!("{}+00:00", civil_text(&value.naive_utc())),
            Self::DateTime(value) => civil_text(value),
            Self::Array(values) => {
                let items: Vec<String> = values.iter().map(Self::display_text).collect();
                format!("[{}]", items.join(", "))
            }
            Self::Map(record) => {
                let entries: Vec<String> = record
                    .iter()
                    .map(|(name, value)| {
                        format!("{}: {}", quoted_text(name), value.display_text())
                    })
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(*value),
            Self::Integer(value) => Value::from(*value),
            Self::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(value) => Value::String(value.clone()),
            Self::Bytes(value) => Value::String(STANDARD.encode(value)),
            Self::Timestamp(value) => {
                Value::String(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::DateTime(value) => {
                Value::String(value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Self::Array(values) => Value::Array(values.iter().map(Self::to_json).collect()),
            Self::Map(record) => record.to_json(),
        }
    }
}

/// Shortest round-trip digits; exponent form outside `[1e-4, 1e16)`.
fn float_text(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if value != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// `YYYY-MM-DD HH:MM:SS`, with microseconds only when non-zero.
fn civil_text(value: &NaiveDateTime) -> String {
    let seconds = value.format("%Y-%m-%d %H:%M:%S");
    match value.nanosecond() / 1_000 {
        0 => seconds.to_string(),
        micros => format!("{seconds}.{:06}", micros.min(999_999)),
    }
}

fn quote_for(has_single: bool, has_double: bool) -> char {
    if has_single && !has_double {
        '"'
    } else {
        '\''
    }
}

fn quoted_text(value: &str) -> String {
    let quote = quote_for(value.contains('\''), value.contains('"'));
    let mut text = String::with_capacity(value.len() + 2);
    text.push(quote);
    for ch in value.chars() {
        match ch {
            '\\' => text.push_str("\\\\"),
            '\n' => text.push_str("\\n"),
            '\r' => text.push_str("\\r"),
            '\t' => text.push_str("\\t"),
            ch if ch == quote => {
                text.push('\\');
                text.push(ch);
            }
            ch if ch.is_control() => text.push_str(&format!("\\x{:02x}", ch as u32)),
            ch => text.push(ch),
        }
    }
    text.push(quote);
    text
}

fn quoted_bytes(value: &[u8]) -> String {
    let quote = quote_for(value.contains(&b'\''), value.contains(&b'"'));
    let mut text = String::with_capacity(value.len() + 3);
    text.push('b');
    text.push(quote);
    for &byte in value {
        match byte {
            b'\\' => text.push_str("\\\\"),
            b'\n' => text.push_str("\\n"),
            b'\r' => text.push_str("\\r"),
            b'\t' => text.push_str("\\t"),
            byte if char::from(byte) == quote => {
                text.push('\\');
                text.push(quote);
            }
            0x20..=0x7e => text.push(char::from(byte)),
            byte => text.push_str(&format!("\\x{byte:02x}")),
        }
    }
    text.push(quote);
    text
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(number) => match number.as_i64() {
                Some(value) => Self::Integer(value),
                None => Self::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(value) => Self::String(value),
            Value::Array(values) => Self::Array(values.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(Record::from(map)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// One warehouse result row: column name to value, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, keeping its original position when it already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let index = self.fields.iter().position(|(existing, _)| existing == name)?;
        Some(self.fields.remove(index).1)
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        Value::Object(map)
    }

    /// Builds a record from a JSON object; any other JSON shape yields `None`.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::from(map)),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter()
            .map(|(name, value)| (name, FieldValue::from(value)))
            .collect()
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}
