//! Measurements in InfluxDB line protocol, as accepted by a telegraf
//! `socket_listener`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl FieldValue {
    fn write_line(&self, out: &mut String) {
        match self {
            Self::Float(v) => out.push_str(&v.to_string()),
            Self::Int(v) => {
                out.push_str(&v.to_string());
                out.push('i');
            }
            Self::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        }
    }
}

/// One structured metric record: measurement name, tags and fields.
#[derive(Debug, Clone)]
pub struct Measurement {
    name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<DateTime<Utc>>,
}

impl Measurement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_tag(&mut self, key: &str, value: &str) -> &mut Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn add_float(&mut self, key: &str, value: f64) -> &mut Self {
        self.fields.insert(key.to_string(), FieldValue::Float(value));
        self
    }

    pub fn add_int(&mut self, key: &str, value: i64) -> &mut Self {
        self.fields.insert(key.to_string(), FieldValue::Int(value));
        self
    }

    pub fn add_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.fields.insert(key.to_string(), FieldValue::Bool(value));
        self
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) -> &mut Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Encode as a single line (without trailing newline).
    ///
    /// Tags with empty values are dropped since line protocol cannot
    /// carry them.
    pub fn to_line_protocol(&self) -> String {
        let mut out = String::with_capacity(128);
        escape_into(&mut out, &self.name, &[',', ' ']);

        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            out.push(',');
            escape_into(&mut out, key, &[',', '=', ' ']);
            out.push('=');
            escape_into(&mut out, value, &[',', '=', ' ']);
        }

        for (i, (key, value)) in self.fields.iter().enumerate() {
            out.push(if i == 0 { ' ' } else { ',' });
            escape_into(&mut out, key, &[',', '=', ' ']);
            out.push('=');
            value.write_line(&mut out);
        }

        if let Some(nanos) = self.timestamp.and_then(|t| t.timestamp_nanos_opt()) {
            out.push(' ');
            out.push_str(&nanos.to_string());
        }
        out
    }
}

fn escape_into(out: &mut String, text: &str, special: &[char]) {
    for c in text.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Destination for measurements.
pub trait MetricSink {
    fn write(&self, measurement: &Measurement) -> anyhow::Result<()>;
}
