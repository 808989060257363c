//! Purpose: Request and response shapes for topic record reads and writes.
//! Exports: `ReadRequest`, `WriteRequest`, `Record`, `WriteResult`, `PagedResponse`.
//! Role: Request-scoped values exchanged with the HTTP layer and library callers.
//! Invariants: Absent `Record` fields are omitted from JSON, never serialized as null.
//! Invariants: Timestamps cross this boundary as ISO-8601 strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::projection::Include;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadRequest {
    pub topic: String,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub timestamp: Option<String>,
    pub limit: usize,
    pub include: Include,
}

impl ReadRequest {
    pub fn new(topic: impl Into<String>, limit: usize) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            offset: None,
            timestamp: None,
            limit,
            include: Include::all(),
        }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_include(mut self, include: Include) -> Self {
        self.include = include;
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteRequest {
    pub topic: String,
    pub partition: Option<i32>,
    pub timestamp: Option<String>,
    pub key: Option<String>,
    pub value: String,
    pub headers: BTreeMap<String, String>,
}

impl WriteRequest {
    pub fn new(topic: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            timestamp: None,
            key: None,
            value: value.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

/// Broker acknowledgment of a write, shaped like a `Record`.
pub type WriteResult = Record;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub size: usize,
    pub page: usize,
}

impl<T> PagedResponse<T> {
    /// A single page holding every item.
    pub fn for_items(items: Vec<T>) -> Self {
        let total = items.len();
        Self {
            items,
            total,
            size: total,
            page: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PagedResponse, Record};
    use serde_json::json;

    #[test]
    fn absent_fields_are_omitted() {
        let record = Record {
            partition: Some(0),
            value: Some("v".to_string()),
            ..Record::default()
        };
        let value = serde_json::to_value(&record).expect("json");
        assert_eq!(value, json!({"partition": 0, "value": "v"}));
    }

    #[test]
    fn timestamp_type_uses_camel_case() {
        let record = Record {
            timestamp_type: Some("CREATE_TIME".to_string()),
            ..Record::default()
        };
        let value = serde_json::to_value(&record).expect("json");
        assert_eq!(value["timestampType"], "CREATE_TIME");
    }

    #[test]
    fn page_counts_items() {
        let page = PagedResponse::for_items(vec![1, 2, 3]);
        assert_eq!(page.total, 3);
        assert_eq!(page.size, 3);
        assert_eq!(page.page, 1);
    }
}
