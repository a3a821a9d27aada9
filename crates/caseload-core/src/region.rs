//! Administrative-region reference table.
//!
//! Maps `(country alpha-2, subdivision name)` to the subdivision part of an
//! ISO 3166-2 code. The built-in table covers the United States; further
//! countries can be merged in from a JSON file shaped like
//! `{ "CA": { "Ontario": "ON", ... } }`.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{EnrichError, PipelineError};

/// Lookup of subdivision codes by exact name.
pub trait RegionTable: Send + Sync {
    /// Resolve `region` within `country` to a full `"<CC>-<SUB>"` code.
    fn subdivision_code(&self, country: &str, region: &str) -> Result<String, EnrichError>;
}

/// ISO 3166-2:US subdivisions (states, district, outlying areas).
const US_SUBDIVISIONS: &[(&str, &str)] = &[
    ("Alabama", "AL"),
    ("Alaska", "AK"),
    ("Arizona", "AZ"),
    ("Arkansas", "AR"),
    ("California", "CA"),
    ("Colorado", "CO"),
    ("Connecticut", "CT"),
    ("Delaware", "DE"),
    ("District of Columbia", "DC"),
    ("Florida", "FL"),
    ("Georgia", "GA"),
    ("Hawaii", "HI"),
    ("Idaho", "ID"),
    ("Illinois", "IL"),
    ("Indiana", "IN"),
    ("Iowa", "IA"),
    ("Kansas", "KS"),
    ("Kentucky", "KY"),
    ("Louisiana", "LA"),
    ("Maine", "ME"),
    ("Maryland", "MD"),
    ("Massachusetts", "MA"),
    ("Michigan", "MI"),
    ("Minnesota", "MN"),
    ("Mississippi", "MS"),
    ("Missouri", "MO"),
    ("Montana", "MT"),
    ("Nebraska", "NE"),
    ("Nevada", "NV"),
    ("New Hampshire", "NH"),
    ("New Jersey", "NJ"),
    ("New Mexico", "NM"),
    ("New York", "NY"),
    ("North Carolina", "NC"),
    ("North Dakota", "ND"),
    ("Ohio", "OH"),
    ("Oklahoma", "OK"),
    ("Oregon", "OR"),
    ("Pennsylvania", "PA"),
    ("Rhode Island", "RI"),
    ("South Carolina", "SC"),
    ("South Dakota", "SD"),
    ("Tennessee", "TN"),
    ("Texas", "TX"),
    ("Utah", "UT"),
    ("Vermont", "VT"),
    ("Virginia", "VA"),
    ("Washington", "WA"),
    ("West Virginia", "WV"),
    ("Wisconsin", "WI"),
    ("Wyoming", "WY"),
    ("American Samoa", "AS"),
    ("Guam", "GU"),
    ("Northern Mariana Islands", "MP"),
    ("Puerto Rico", "PR"),
    ("United States Minor Outlying Islands", "UM"),
    ("Virgin Islands, U.S.", "VI"),
];

/// In-memory reference table, immutable once handed to an [`Enricher`].
///
/// [`Enricher`]: crate::enrich::Enricher
#[derive(Debug, Clone, Default)]
pub struct StaticRegionTable {
    /// alpha-2 → (subdivision name → subdivision code)
    countries: HashMap<String, HashMap<String, String>>,
}

impl StaticRegionTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in table (United States).
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.extend(
            "US",
            US_SUBDIVISIONS
                .iter()
                .map(|(name, code)| (name.to_string(), code.to_string())),
        );
        table
    }

    /// Add (or overwrite) subdivisions for `country`.
    pub fn extend(
        &mut self,
        country: impl Into<String>,
        entries: impl IntoIterator<Item = (String, String)>,
    ) {
        self.countries
            .entry(country.into().to_ascii_uppercase())
            .or_default()
            .extend(entries);
    }

    /// Merge the countries from a JSON file into this table.
    ///
    /// Returns the number of subdivisions read from the file.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, PipelineError> {
        let input_err = |reason: String| PipelineError::Input {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| input_err(e.to_string()))?;
        let parsed: HashMap<String, HashMap<String, String>> =
            serde_json::from_str(&content).map_err(|e| input_err(e.to_string()))?;

        let mut count = 0;
        for (country, entries) in parsed {
            count += entries.len();
            self.extend(country, entries);
        }
        Ok(count)
    }

    /// Number of countries in the table.
    pub fn country_count(&self) -> usize {
        self.countries.len()
    }
}

impl RegionTable for StaticRegionTable {
    fn subdivision_code(&self, country: &str, region: &str) -> Result<String, EnrichError> {
        let lookup_failed = || EnrichError::LookupFailed {
            country: country.to_string(),
            region: region.to_string(),
        };
        let subdivisions = self
            .countries
            .get(&country.to_ascii_uppercase())
            .ok_or_else(lookup_failed)?;
        let code = subdivisions.get(region).ok_or_else(lookup_failed)?;
        Ok(format!("{}-{}", country.to_ascii_uppercase(), code))
    }
}
