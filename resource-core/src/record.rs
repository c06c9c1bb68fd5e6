/*!
Exported resource records and the on-disk file layout.

A resource file is a block of `#`-prefixed provenance comments followed by
the pretty-printed JSON record:

```text
# 1700000000
# ---------------------------------------------------------------------
#
#    Name      : user-42
#    Generated : 2023-11-14T22:13:20+00:00
#    Hash      : 78f00e6526ea513465c83fdfe6eb9a999a3f405cb023ddfabc26a2f24c8cb148
#
#    This file is generated by my_app::UserCache.
#
#    Do not edit it manually.
#
# ---------------------------------------------------------------------
{
  "name": "user-42",
  ...
}
```
*/

use crate::key::KeyCodec;
use crate::{ResourceError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const RULE: &str = "---------------------------------------------------------------------";
const GENERATOR_PREFIX: &str = "This file is generated by ";

/// The record written to and read back from a resource file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceRecord<T = Value> {
    /// Resource name the entity was constructed with
    pub name: String,

    /// File path the record was written to
    pub path: String,

    /// Type that produced the record
    pub generator: String,

    /// Human-readable generation time (RFC 3339)
    pub generated: String,

    /// Generation time as seconds since the Unix epoch
    pub timestamp: i64,

    /// Coarse type label of `data`
    #[serde(rename = "type")]
    pub type_label: String,

    /// Content hash of `data` at export time
    pub hash: String,

    /// The persisted payload
    pub data: T,
}

impl ResourceRecord<Value> {
    /// Decode the payload into a concrete type
    pub fn into_typed<U: DeserializeOwned>(self) -> Result<ResourceRecord<U>> {
        let data = serde_json::from_value(self.data).map_err(ResourceError::Decode)?;
        Ok(ResourceRecord {
            name: self.name,
            path: self.path,
            generator: self.generator,
            generated: self.generated,
            timestamp: self.timestamp,
            type_label: self.type_label,
            hash: self.hash,
            data,
        })
    }

    /// Verify the payload against the recorded hash
    pub fn verify_integrity(&self, codec: &dyn KeyCodec) -> Result<()> {
        let computed = codec.hash_key(&self.data);
        if computed == self.hash {
            Ok(())
        } else {
            Err(ResourceError::IntegrityCheckFailed {
                expected: self.hash.clone(),
                actual: computed,
            })
        }
    }
}

/// Coarse runtime type label of a payload value
pub fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "double",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Provenance comments at the top of a resource file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceHeader {
    pub name: String,
    pub generated: String,
    pub unix_timestamp: Option<i64>,
    pub hash: String,
    pub generator: String,
}

impl ProvenanceHeader {
    /// Header describing an exported record
    pub fn for_record<T>(record: &ResourceRecord<T>) -> Self {
        Self {
            name: record.name.clone(),
            generated: record.generated.clone(),
            unix_timestamp: Some(record.timestamp),
            hash: record.hash.clone(),
            generator: record.generator.clone(),
        }
    }

    /// Render the header as comment lines, each ending in a newline
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(13);
        if let Some(timestamp) = self.unix_timestamp {
            lines.push(format!("# {timestamp}"));
        }
        lines.push(format!("# {RULE}"));
        lines.push("#".to_string());
        lines.push(format!("#    Name      : {}", self.name));
        lines.push(format!("#    Generated : {}", self.generated));
        lines.push(format!("#    Hash      : {}", self.hash));
        lines.push("#".to_string());
        lines.push(format!("#    {GENERATOR_PREFIX}{}.", self.generator));
        lines.push("#".to_string());
        lines.push("#    Do not edit it manually.".to_string());
        lines.push("#".to_string());
        lines.push(format!("# {RULE}"));

        let mut rendered = lines.join("\n");
        rendered.push('\n');
        rendered
    }

    /// Parse header comment lines produced by [`ProvenanceHeader::render`]
    pub fn parse(text: &str) -> Result<Self> {
        let mut name = None;
        let mut generated = None;
        let mut hash = None;
        let mut generator = None;
        let mut unix_timestamp = None;

        for line in text.lines() {
            let Some(comment) = line.trim().strip_prefix('#') else {
                continue;
            };
            let comment = comment.trim();

            if let Some(rest) = comment.strip_prefix(GENERATOR_PREFIX) {
                generator = Some(rest.trim_end_matches('.').to_string());
            } else if let Some((key, value)) = comment.split_once(':') {
                let value = value.trim().to_string();
                match key.trim() {
                    "Name" => name = Some(value),
                    "Generated" => generated = Some(value),
                    "Hash" => hash = Some(value),
                    _ => {}
                }
            } else if unix_timestamp.is_none() && name.is_none() {
                unix_timestamp = comment.parse::<i64>().ok();
            }
        }

        let missing = |field: &str| {
            ResourceError::invalid_format(format!("Provenance header is missing '{field}'"))
        };

        Ok(Self {
            name: name.ok_or_else(|| missing("Name"))?,
            generated: generated.ok_or_else(|| missing("Generated"))?,
            unix_timestamp,
            hash: hash.ok_or_else(|| missing("Hash"))?,
            generator: generator.ok_or_else(|| missing("generator"))?,
        })
    }
}

/// A complete resource file: provenance header plus record
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceFile {
    pub header: ProvenanceHeader,
    pub record: ResourceRecord<Value>,
}

impl ResourceFile {
    pub fn new(record: ResourceRecord<Value>) -> Self {
        Self {
            header: ProvenanceHeader::for_record(&record),
            record,
        }
    }

    /// Render the header followed by an already serialized record body
    pub fn render_with_body(header: &ProvenanceHeader, body: &str) -> String {
        let mut content = header.render();
        content.push_str(body);
        if !body.ends_with('\n') {
            content.push('\n');
        }
        content
    }

    /// Render the full file content
    pub fn render(&self) -> Result<String> {
        let body = serde_json::to_string_pretty(&self.record)
            .map_err(|e| ResourceError::export(self.record.name.clone(), e))?;
        Ok(Self::render_with_body(&self.header, &body))
    }

    /// Decode file content back into header and record
    ///
    /// The header must agree with the record it describes.
    pub fn decode(content: &str) -> Result<Self> {
        let mut body_start = content.len();
        let mut offset = 0;
        for line in content.split_inclusive('\n') {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                body_start = offset;
                break;
            }
            offset += line.len();
        }

        let (header_text, body) = content.split_at(body_start);
        if body.trim().is_empty() {
            return Err(ResourceError::invalid_format("Resource file has no record body"));
        }

        let header = ProvenanceHeader::parse(header_text)?;
        let record: ResourceRecord<Value> =
            serde_json::from_str(body).map_err(ResourceError::Decode)?;

        if header.name != record.name || header.hash != record.hash {
            return Err(ResourceError::invalid_format(format!(
                "Provenance header ({}, {}) does not describe the record ({}, {})",
                header.name, header.hash, record.name, record.hash
            )));
        }

        Ok(Self { header, record })
    }
}
