//! Trace data model exchanged with the query service.
//!
//! Field names serialize to the JSON shape of the `/api` HTTP surface.
//! Timestamps are unix microseconds, durations microseconds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(rename = "type", default = "string_type")]
    pub value_type: String,
    pub value: String,
}

fn string_type() -> String {
    "string".to_string()
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value_type: string_type(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub service_name: String,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(rename = "spanID")]
    pub span_id: String,
    #[serde(rename = "parentSpanID", default, skip_serializing_if = "String::is_empty")]
    pub parent_span_id: String,
    pub operation_name: String,
    #[serde(default)]
    pub span_kind: String,
    pub start_time: i64,
    pub duration: i64,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
    pub process: Process,
}

impl Span {
    pub fn service_name(&self) -> &str {
        &self.process.service_name
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .chain(&self.process.tags)
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "traceID")]
    pub trace_id: String,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    pub span_kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyLink {
    pub parent: String,
    pub child: String,
    pub call_count: u64,
}

/// Filter for trace search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceQueryParameters {
    pub service_name: String,
    pub operation_name: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub start_time_min: i64,
    pub start_time_max: i64,
    pub duration_min: Option<i64>,
    pub duration_max: Option<i64>,
    /// Maximum number of traces returned.
    pub search_depth: usize,
}

impl TraceQueryParameters {
    /// Whether `span` satisfies every filter.
    pub fn matches(&self, span: &Span) -> bool {
        span.service_name() == self.service_name
            && self
                .operation_name
                .as_deref()
                .map_or(true, |op| span.operation_name == op)
            && span.start_time >= self.start_time_min
            && span.start_time <= self.start_time_max
            && self.duration_min.map_or(true, |min| span.duration >= min)
            && self.duration_max.map_or(true, |max| span.duration <= max)
            && self
                .tags
                .iter()
                .all(|(k, v)| span.tag(k) == Some(v.as_str()))
    }
}
