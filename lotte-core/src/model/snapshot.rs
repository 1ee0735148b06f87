use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ModelError;
use crate::model::entry::{Translations, TranslationString};

/// One string as delivered by the server on page load.
#[derive(Debug, Deserialize, Clone)]
pub struct StringRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: u64,

    #[serde(default)]
    pub source_entity: String,

    #[serde(default)]
    pub context: Value,

    #[serde(default)]
    pub occurrence: Value,

    #[serde(default, alias = "original_strings")]
    pub source_strings: Translations,

    #[serde(default, alias = "translated_strings")]
    pub translations: Translations,
}

impl StringRecord {
    pub fn into_entry(self) -> TranslationString {
        TranslationString::new(
            self.id,
            self.source_entity,
            self.source_strings,
            self.translations,
            self.context,
            self.occurrence,
        )
    }
}

fn de_id<'de, D>(d: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    id_from_value(&v).ok_or_else(|| serde::de::Error::custom(format!("invalid id: {v}")))
}

fn id_from_value(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accepts `{"strings": [...]}` or the table feed `{"aaData": [[id, key, {"source_strings": {..}}, {..}], ...]}`.
pub fn parse(snapshot: &Value) -> Result<Vec<StringRecord>, ModelError> {
    let records = if let Some(arr) = snapshot.get("strings").and_then(|v| v.as_array()) {
        parse_records(arr)?
    } else if let Some(rows) = snapshot.get("aaData").and_then(|v| v.as_array()) {
        parse_rows(rows)?
    } else {
        return Err(ModelError::InvalidSnapshot(
            "expected a 'strings' or 'aaData' array".into(),
        ));
    };

    let mut seen = HashSet::with_capacity(records.len());
    for r in &records {
        if !seen.insert(r.id) {
            return Err(ModelError::DuplicateId(r.id));
        }
    }

    Ok(records)
}

fn parse_records(arr: &[Value]) -> Result<Vec<StringRecord>, ModelError> {
    let mut out = Vec::with_capacity(arr.len());

    for (i, v) in arr.iter().cloned().enumerate() {
        match serde_json::from_value::<StringRecord>(v) {
            Ok(r) => out.push(r),
            Err(e) => {
                return Err(ModelError::InvalidSnapshot(format!(
                    "invalid string at index {i}: {e}"
                )))
            }
        }
    }

    Ok(out)
}

fn parse_rows(rows: &[Value]) -> Result<Vec<StringRecord>, ModelError> {
    let mut out = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let bad = |what: &str| ModelError::InvalidSnapshot(format!("row {i}: {what}"));

        let cells = row.as_array().ok_or_else(|| bad("not an array"))?;
        if cells.len() < 4 {
            return Err(bad("expected 4 cells"));
        }

        let id = id_from_value(&cells[0]).ok_or_else(|| bad("invalid id"))?;
        let source_entity = cells[1].as_str().unwrap_or_default().to_string();

        let source_strings: Translations = cells[2]
            .get("source_strings")
            .cloned()
            .map(serde_json::from_value::<Translations>)
            .transpose()
            .map_err(|e| bad(&format!("source_strings: {e}")))?
            .unwrap_or_default();

        let translations: Translations = serde_json::from_value(cells[3].clone())
            .map_err(|e| bad(&format!("translations: {e}")))?;

        out.push(StringRecord {
            id,
            source_entity,
            context: Value::Null,
            occurrence: Value::Null,
            source_strings,
            translations,
        });
    }

    Ok(out)
}
