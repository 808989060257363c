// Field selection for polled records; excluded fields are never computed.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::record::Record;
use crate::broker::{Header, RawRecord};
use crate::core::error::{Error, ErrorKind};
use crate::core::timestamp::format_millis;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Field {
    Partition,
    Offset,
    Timestamp,
    TimestampType,
    Key,
    Value,
    Headers,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Partition,
        Field::Offset,
        Field::Timestamp,
        Field::TimestampType,
        Field::Key,
        Field::Value,
        Field::Headers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Partition => "partition",
            Field::Offset => "offset",
            Field::Timestamp => "timestamp",
            Field::TimestampType => "timestampType",
            Field::Key => "key",
            Field::Value => "value",
            Field::Headers => "headers",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.name() == value)
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown record field: {value}"))
                    .with_hint(
                        "Use partition, offset, timestamp, timestampType, key, value, or headers.",
                    )
            })
    }
}

/// Set of fields to populate; the empty set selects every field.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Include {
    fields: BTreeSet<Field>,
}

impl Include {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(fields: impl IntoIterator<Item = Field>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Parses field names, ignoring blanks so `include=` means every field.
    pub fn parse<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Self, Error> {
        let fields = names
            .into_iter()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(Field::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { fields })
    }

    pub fn includes(&self, field: Field) -> bool {
        self.fields.is_empty() || self.fields.contains(&field)
    }
}

pub fn project(raw: &RawRecord, include: &Include) -> Record {
    let pick = |field: Field| include.includes(field);
    Record {
        partition: pick(Field::Partition).then_some(raw.partition),
        offset: pick(Field::Offset).then_some(raw.offset),
        timestamp: pick(Field::Timestamp).then(|| format_millis(raw.timestamp)),
        timestamp_type: pick(Field::TimestampType)
            .then(|| raw.timestamp_type.name().to_string()),
        key: if pick(Field::Key) { raw.key.clone() } else { None },
        value: if pick(Field::Value) { raw.value.clone() } else { None },
        headers: pick(Field::Headers).then(|| decode_headers(&raw.headers)),
    }
}

/// Header values are decoded lossily as UTF-8; a null value becomes the empty string.
fn decode_headers(headers: &[Header]) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|header| {
            let value = header
                .value
                .as_deref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            (header.key.clone(), value)
        })
        .collect()
}
