//! Query-string parsing for the `/api` routes.

use std::collections::{BTreeMap, HashMap};

use crate::http::response::ApiError;
use crate::query::TraceQueryParameters;

/// Traces returned when `limit` is absent.
pub const DEFAULT_LIMIT: usize = 100;

/// Search window when `start` is absent: one hour, in microseconds.
pub const DEFAULT_LOOKBACK_MICROS: i64 = 60 * 60 * 1_000_000;

/// Dependency window when `lookback` is absent: one day, in milliseconds.
pub const DEFAULT_DEPENDENCY_LOOKBACK_MILLIS: i64 = 24 * 60 * 60 * 1_000;

const MAX_TRACE_ID_LEN: usize = 32;

/// Decoded query string preserving repeated keys.
#[derive(Debug, Default)]
pub struct QueryParams {
    values: HashMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn parse(raw: Option<&str>) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
            values.entry(key.into_owned()).or_default().push(value.into_owned());
        }
        Self { values }
    }

    /// First non-empty value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.iter().find(|s| !s.is_empty()))
            .map(String::as_str)
    }

    pub fn all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    fn int(&self, key: &str) -> Result<Option<i64>, ApiError> {
        self.get(key)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| ApiError::bad_request(format!("unable to parse param '{key}': {v:?} is not an integer")))
            })
            .transpose()
    }

    fn duration(&self, key: &str) -> Result<Option<i64>, ApiError> {
        self.get(key)
            .map(|v| {
                parse_duration(v)
                    .ok_or_else(|| ApiError::bad_request(format!("unable to parse param '{key}': invalid duration {v:?}")))
            })
            .transpose()
    }
}

/// Parse a duration like `1h2m3.5s`, `20ms` or `5us` into microseconds.
pub fn parse_duration(input: &str) -> Option<i64> {
    let s = input.trim();
    if s == "0" {
        return Some(0);
    }
    if s.is_empty() {
        return None;
    }

    let mut rest = s;
    let mut total = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let micros_per_unit = match &rest[..unit_len] {
            "ns" => 0.001,
            "us" | "µs" => 1.0,
            "ms" => 1_000.0,
            "s" => 1_000_000.0,
            "m" => 60_000_000.0,
            "h" => 3_600_000_000.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += value * micros_per_unit;
    }

    (total <= i64::MAX as f64).then_some(total.round() as i64)
}

/// Validate a hex trace ID of up to 32 digits.
pub fn trace_id(raw: &str) -> Result<String, ApiError> {
    let id = raw.trim();
    if id.is_empty() || id.len() > MAX_TRACE_ID_LEN || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ApiError::bad_request(format!("invalid trace id {raw:?}")));
    }
    Ok(id.to_ascii_lowercase())
}

fn tags(params: &QueryParams) -> Result<BTreeMap<String, String>, ApiError> {
    let mut tags = BTreeMap::new();

    for raw in params.all("tag").iter().filter(|s| !s.is_empty()) {
        let (key, value) = raw
            .split_once(':')
            .ok_or_else(|| ApiError::bad_request(format!("malformed 'tag' parameter, expecting key:value, received: {raw}")))?;
        tags.insert(key.to_string(), value.to_string());
    }

    if let Some(raw) = params.get("tags") {
        let parsed: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)
            .map_err(|e| ApiError::bad_request(format!("malformed 'tags' parameter, cannot unmarshal JSON: {e}")))?;
        for (key, value) in parsed {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            tags.insert(key, value);
        }
    }

    Ok(tags)
}

/// Build a trace search from `/api/traces` parameters.
///
/// `start`/`end` are unix microseconds; `end` defaults to `now_micros` and
/// `start` to `end - lookback` (lookback defaulting to one hour).
pub fn trace_query(params: &QueryParams, now_micros: i64) -> Result<TraceQueryParameters, ApiError> {
    let service_name = params
        .get("service")
        .ok_or_else(|| ApiError::bad_request("parameter 'service' is required"))?
        .to_string();

    let end = params.int("end")?.unwrap_or(now_micros);
    let lookback = params.duration("lookback")?.unwrap_or(DEFAULT_LOOKBACK_MICROS);
    let start = params.int("start")?.unwrap_or_else(|| end.saturating_sub(lookback));
    if start > end {
        return Err(ApiError::bad_request("'start' must not be after 'end'"));
    }

    let duration_min = params.duration("minDuration")?;
    let duration_max = params.duration("maxDuration")?;
    if let (Some(min), Some(max)) = (duration_min, duration_max) {
        if min > max {
            return Err(ApiError::bad_request("'maxDuration' should be greater than 'minDuration'"));
        }
    }

    let search_depth = match params.int("limit")? {
        None => DEFAULT_LIMIT,
        Some(limit) if limit > 0 => usize::try_from(limit).unwrap_or(DEFAULT_LIMIT),
        Some(_) => return Err(ApiError::bad_request("'limit' must be a positive integer")),
    };

    Ok(TraceQueryParameters {
        service_name,
        operation_name: params.get("operation").map(str::to_string),
        tags: tags(params)?,
        start_time_min: start,
        start_time_max: end,
        duration_min,
        duration_max,
        search_depth,
    })
}

/// Trace IDs requested with repeated `traceID` parameters.
pub fn trace_ids(params: &QueryParams) -> Result<Vec<String>, ApiError> {
    params
        .all("traceID")
        .iter()
        .filter(|s| !s.is_empty())
        .map(|raw| trace_id(raw))
        .collect()
}

/// `(end_ts, lookback)` in microseconds from `/api/dependencies`, whose
/// `endTs` and `lookback` are milliseconds.
pub fn dependencies_window(params: &QueryParams, now_micros: i64) -> Result<(i64, i64), ApiError> {
    let end_ts = params
        .int("endTs")?
        .map(|ms| ms.saturating_mul(1_000))
        .unwrap_or(now_micros);
    let lookback = params.int("lookback")?.unwrap_or(DEFAULT_DEPENDENCY_LOOKBACK_MILLIS);
    if lookback < 0 {
        return Err(ApiError::bad_request("'lookback' must not be negative"));
    }
    Ok((end_ts, lookback.saturating_mul(1_000)))
}
