//! Record enrichment: parse raw fields and resolve the region code.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EnrichError;
use crate::region::RegionTable;
use crate::types::{Geo, NormalizedRecord, RawRecord};

/// A region name whose code is fixed instead of looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOverride {
    pub region: String,
    /// May be empty for entities that are not administrative regions.
    pub code: String,
}

impl RegionOverride {
    pub fn new(region: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            code: code.into(),
        }
    }

    /// Cruise ships carry an empty code; the US Virgin Islands appear under a
    /// name the reference table does not use.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("Virgin Islands", "US-VI"),
            Self::new("Grand Princess", ""),
            Self::new("Diamond Princess", ""),
        ]
    }
}

/// Turns [`RawRecord`]s into [`NormalizedRecord`]s.
///
/// Holds no mutable state: enriching the same record twice yields equal values.
#[derive(Clone)]
pub struct Enricher {
    table: Arc<dyn RegionTable>,
    overrides: Vec<RegionOverride>,
}

impl Enricher {
    /// Enricher with the default overrides.
    pub fn new(table: Arc<dyn RegionTable>) -> Self {
        Self::with_overrides(table, RegionOverride::defaults())
    }

    pub fn with_overrides(table: Arc<dyn RegionTable>, overrides: Vec<RegionOverride>) -> Self {
        Self { table, overrides }
    }

    pub fn enrich(&self, raw: &RawRecord) -> Result<NormalizedRecord, EnrichError> {
        let timestamp = DateTime::parse_from_rfc3339(&raw.date)
            .map_err(|e| EnrichError::parse("Date", format!("{e} (value '{}')", raw.date)))?
            .with_timezone(&Utc);

        let region_code = self.region_code(&raw.country_code, &raw.province)?;

        let geo = Geo {
            lat: parse_degrees("Lat", &raw.lat)?,
            lon: parse_degrees("Lon", &raw.lon)?,
        };

        Ok(NormalizedRecord {
            timestamp,
            country_name: raw.country.clone(),
            country_code: raw.country_code.clone(),
            region: raw.province.clone(),
            region_code,
            sub_region: raw.city.clone(),
            sub_region_code: raw.city_code.clone(),
            geo,
            cases: parse_cases(&raw.cases)?,
            status: raw.status.clone(),
        })
    }

    fn region_code(&self, country: &str, region: &str) -> Result<String, EnrichError> {
        if let Some(o) = self.overrides.iter().find(|o| o.region == region) {
            return Ok(o.code.clone());
        }
        self.table.subdivision_code(country, region)
    }
}

fn parse_degrees(field: &'static str, value: &str) -> Result<f64, EnrichError> {
    let v: f64 = value
        .trim()
        .parse()
        .map_err(|_| EnrichError::parse(field, format!("'{value}' is not a decimal number")))?;
    if !v.is_finite() {
        return Err(EnrichError::parse(field, format!("'{value}' is not finite")));
    }
    Ok(v)
}

fn parse_cases(n: &serde_json::Number) -> Result<u64, EnrichError> {
    if let Some(v) = n.as_u64() {
        return Ok(v);
    }
    // Integral floats such as `12.0` are accepted.
    match n.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        _ => Err(EnrichError::parse(
            "Cases",
            format!("{n} is not a non-negative integer"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::StaticRegionTable;

    fn enricher() -> Enricher {
        Enricher::new(Arc::new(StaticRegionTable::builtin()))
    }

    fn raw(province: &str) -> RawRecord {
        RawRecord {
            date: "2020-03-22T00:00:00Z".into(),
            country: "United States of America".into(),
            country_code: "US".into(),
            province: province.into(),
            city: None,
            city_code: None,
            lat: "18.34".into(),
            lon: "-64.9".into(),
            cases: serde_json::Number::from(6u64),
            status: "confirmed".into(),
        }
    }

    #[test]
    fn virgin_islands_override() {
        let rec = enricher().enrich(&raw("Virgin Islands")).unwrap();
        assert_eq!(rec.region_code, "US-VI");
    }

    #[test]
    fn cruise_ships_have_empty_code() {
        let e = enricher();
        assert_eq!(e.enrich(&raw("Grand Princess")).unwrap().region_code, "");
        assert_eq!(e.enrich(&raw("Diamond Princess")).unwrap().region_code, "");
    }

    #[test]
    fn table_lookup() {
        let rec = enricher().enrich(&raw("New York")).unwrap();
        assert_eq!(rec.region_code, "US-NY");
        assert_eq!(rec.geo, Geo { lat: 18.34, lon: -64.9 });
        assert_eq!(rec.cases, 6);
        assert_eq!(rec.timestamp.to_rfc3339(), "2020-03-22T00:00:00+00:00");
    }

    #[test]
    fn unknown_region_is_lookup_failure() {
        let err = enricher().enrich(&raw("Atlantis")).unwrap_err();
        assert!(matches!(err, EnrichError::LookupFailed { .. }));
    }

    #[test]
    fn malformed_fields() {
        let e = enricher();

        let mut r = raw("Texas");
        r.date = "22/03/2020".into();
        assert!(matches!(e.enrich(&r), Err(EnrichError::ParseFailed { field: "Date", .. })));

        let mut r = raw("Texas");
        r.lon = "west".into();
        assert!(matches!(e.enrich(&r), Err(EnrichError::ParseFailed { field: "Lon", .. })));

        let mut r = raw("Texas");
        r.cases = serde_json::Number::from(-3);
        assert!(matches!(e.enrich(&r), Err(EnrichError::ParseFailed { field: "Cases", .. })));

        let mut r = raw("Texas");
        r.cases = serde_json::Number::from_f64(2.5).unwrap();
        assert!(matches!(e.enrich(&r), Err(EnrichError::ParseFailed { field: "Cases", .. })));
    }

    #[test]
    fn integral_float_cases_accepted() {
        let mut r = raw("Texas");
        r.cases = serde_json::Number::from_f64(12.0).unwrap();
        assert_eq!(enricher().enrich(&r).unwrap().cases, 12);
    }

    #[test]
    fn enrichment_is_idempotent() {
        let e = enricher();
        let mut r = raw("Ohio");
        r.city = Some("Franklin".into());
        r.city_code = Some("39049".into());

        let a = serde_json::to_vec(&e.enrich(&r).unwrap()).unwrap();
        let b = serde_json::to_vec(&e.enrich(&r).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn custom_overrides_replace_defaults() {
        let e = Enricher::with_overrides(
            Arc::new(StaticRegionTable::builtin()),
            vec![RegionOverride::new("Atlantis", "US-ZZ")],
        );
        assert_eq!(e.enrich(&raw("Atlantis")).unwrap().region_code, "US-ZZ");
        assert!(e.enrich(&raw("Grand Princess")).is_err());
    }
}
