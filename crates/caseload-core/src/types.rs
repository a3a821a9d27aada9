//! Shared data types: raw and normalized records, batches, batch reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EnrichError, RecordIndexError};

/// One element of the input dataset, with every field type-checked but not
/// yet parsed or enriched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "CountryCode")]
    pub country_code: String,
    #[serde(rename = "Province")]
    pub province: String,
    #[serde(rename = "City", default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(rename = "CityCode", default, skip_serializing_if = "Option::is_none")]
    pub city_code: Option<String>,
    /// Latitude as a decimal string, e.g. `"35.6301"`.
    #[serde(rename = "Lat")]
    pub lat: String,
    /// Longitude as a decimal string.
    #[serde(rename = "Lon")]
    pub lon: String,
    #[serde(rename = "Cases")]
    pub cases: serde_json::Number,
    #[serde(rename = "Status")]
    pub status: String,
}

impl RawRecord {
    /// Extract a raw record from a JSON object, naming the first field that is
    /// missing or has the wrong type.
    pub fn from_value(value: &Value) -> Result<Self, EnrichError> {
        let obj = value
            .as_object()
            .ok_or_else(|| EnrichError::parse("<record>", "expected a JSON object"))?;

        Ok(Self {
            date: required_str(obj, "Date")?,
            country: required_str(obj, "Country")?,
            country_code: required_str(obj, "CountryCode")?,
            province: required_str(obj, "Province")?,
            city: optional_str(obj, "City")?,
            city_code: optional_str(obj, "CityCode")?,
            lat: required_str(obj, "Lat")?,
            lon: required_str(obj, "Lon")?,
            cases: match obj.get("Cases") {
                Some(Value::Number(n)) => n.clone(),
                Some(other) => {
                    return Err(EnrichError::parse(
                        "Cases",
                        format!("expected a number, got {}", json_type(other)),
                    ))
                }
                None => return Err(EnrichError::parse("Cases", "missing")),
            },
            status: required_str(obj, "Status")?,
        })
    }
}

fn required_str(obj: &Map<String, Value>, field: &'static str) -> Result<String, EnrichError> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(EnrichError::parse(
            field,
            format!("expected a string, got {}", json_type(other)),
        )),
        None => Err(EnrichError::parse(field, "missing")),
    }
}

fn optional_str(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, EnrichError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(EnrichError::parse(
            field,
            format!("expected a string, got {}", json_type(other)),
        )),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Geographic coordinates in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub lat: f64,
    pub lon: f64,
}

/// A fully parsed and enriched record, ready to be indexed.
///
/// Field names on the wire follow the document layout of the target index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub country_name: String,
    pub country_code: String,
    #[serde(rename = "province")]
    pub region: String,
    /// `"<COUNTRY>-<SUBDIVISION>"`, or empty for non-administrative entities.
    #[serde(rename = "province_code")]
    pub region_code: String,
    /// Omitted from the document when the input has no city.
    #[serde(rename = "city", default, skip_serializing_if = "Option::is_none")]
    pub sub_region: Option<String>,
    #[serde(rename = "city_code", default, skip_serializing_if = "Option::is_none")]
    pub sub_region_code: Option<String>,
    pub geo: Geo,
    pub cases: u64,
    pub status: String,
}

/// An ordered group of records with a 1-based sequence id.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub id: u64,
    pub records: Vec<NormalizedRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of one batch, sent by a worker to the completion barrier.
///
/// One report is emitted for every batch a worker pulls off the queue, whether
/// or not every record was indexed.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: u64,
    pub worker_id: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub first_error: Option<RecordIndexError>,
}

impl BatchReport {
    /// Returns `true` if every record in the batch was indexed.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_json() -> Value {
        json!({
            "Date": "2020-03-22T00:00:00Z",
            "Country": "United States of America",
            "CountryCode": "US",
            "Province": "Texas",
            "Lat": "31.05",
            "Lon": "-97.56",
            "Cases": 334,
            "Status": "confirmed"
        })
    }

    #[test]
    fn extracts_required_and_optional_fields() {
        let raw = RawRecord::from_value(&raw_json()).unwrap();
        assert_eq!(raw.province, "Texas");
        assert_eq!(raw.city, None);
        assert_eq!(raw.cases.as_u64(), Some(334));
    }

    #[test]
    fn missing_field_is_named() {
        let mut v = raw_json();
        v.as_object_mut().unwrap().remove("Status");
        let err = RawRecord::from_value(&v).unwrap_err();
        assert!(matches!(err, EnrichError::ParseFailed { field: "Status", .. }));
    }

    #[test]
    fn wrong_type_is_named() {
        let mut v = raw_json();
        v["Lat"] = json!(31.05);
        let err = RawRecord::from_value(&v).unwrap_err();
        assert_eq!(err.to_string(), "field 'Lat': expected a string, got number");
    }

    #[test]
    fn document_omits_missing_city() {
        let record = NormalizedRecord {
            timestamp: "2020-03-22T00:00:00Z".parse().unwrap(),
            country_name: "United States of America".into(),
            country_code: "US".into(),
            region: "Texas".into(),
            region_code: "US-TX".into(),
            sub_region: None,
            sub_region_code: None,
            geo: Geo { lat: 31.05, lon: -97.56 },
            cases: 334,
            status: "confirmed".into(),
        };
        let doc = serde_json::to_value(&record).unwrap();
        assert!(doc.get("city").is_none());
        assert!(doc.get("city_code").is_none());
        assert_eq!(doc["province_code"], "US-TX");

        let with_city = NormalizedRecord {
            sub_region: Some("Travis".into()),
            sub_region_code: Some("48453".into()),
            ..record
        };
        let doc = serde_json::to_value(&with_city).unwrap();
        assert_eq!(doc["city"], "Travis");
        assert_eq!(doc["city_code"], "48453");
    }

    #[test]
    fn null_city_is_absent() {
        let mut v = raw_json();
        v["City"] = Value::Null;
        let raw = RawRecord::from_value(&v).unwrap();
        assert!(raw.city.is_none());
    }
}
