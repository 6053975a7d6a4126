//! Task data structure and related functionality.
//!
//! This module defines the `Task` record shared by the store, the hierarchy
//! helpers and the scheduler. Files written by older tools are not always
//! tidy (durations as strings, predecessor lists as bare numbers), so the
//! deserialisers here accept those shapes and fall back to "absent" for
//! anything they cannot read.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::calendar::parse_date;

/// One row of the work-breakdown structure.
///
/// `start` and `finish` stay as text because they may hold authored values
/// the scheduler has not normalised yet; use [`Task::start_date`] and
/// [`Task::finish_date`] to read them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_name")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub duration: Option<u32>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub start: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub finish: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub predecessors: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub resource: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub parent_id: Option<u64>,
    /// Recomputed on every scheduling run; never written out.
    #[serde(default, skip_serializing)]
    pub is_summary: bool,
}

impl Task {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Task {
            id,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Blank-named rows are entry placeholders, not tasks.
    pub fn is_placeholder(&self) -> bool {
        self.name.trim().is_empty()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start.as_deref().and_then(parse_date)
    }

    pub fn finish_date(&self) -> Option<NaiveDate> {
        self.finish.as_deref().and_then(parse_date)
    }

    /// Authored duration, or one workday when there is none.
    pub fn effective_duration(&self) -> u32 {
        self.duration.unwrap_or(1)
    }

    /// Predecessor ids in the order written, with unreadable entries dropped.
    ///
    /// `"abc;  ;3"` yields `[3]`.
    pub fn predecessor_ids(&self) -> Vec<u64> {
        self.predecessors
            .as_deref()
            .map(|text| {
                text.split(';')
                    .filter_map(|part| parse_leading_int(part.trim()))
                    .filter_map(|n| u64::try_from(n).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Predecessor entries as written (trimmed, blanks removed).
    pub fn predecessor_labels(&self) -> Vec<String> {
        self.predecessors
            .as_deref()
            .map(|text| {
                text.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Parse the integer at the start of `s`, ignoring any trailing text.
///
/// `"12"`, `"12 days"` and `"+12"` all give 12; `"days"` and `""` give `None`.
pub fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn lenient_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_text(deserializer)?.unwrap_or_default())
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let n = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => parse_leading_int(&s),
        _ => None,
    };
    Ok(n.and_then(|n| u32::try_from(n).ok()))
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
