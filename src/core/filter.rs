use crate::domain::model::ParcelRecord;
use serde::Serialize;
use std::collections::HashMap;

/// Record filter; unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelFilter {
    /// Substring of the owner name or parcel id, case-insensitive
    pub search: Option<String>,
    /// Exact property class description, e.g. "One Family Residential"
    pub property_type: Option<String>,
    pub municipality: Option<String>,
    pub min_acreage: Option<f64>,
    pub max_acreage: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl ParcelFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = Some(text.trim().to_lowercase()).filter(|t| !t.is_empty());
        self
    }

    pub fn with_property_type(mut self, description: impl Into<String>) -> Self {
        self.property_type = Some(description.into());
        self
    }

    pub fn with_municipality(mut self, name: impl Into<String>) -> Self {
        self.municipality = Some(name.into());
        self
    }

    pub fn with_acreage(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_acreage = min;
        self.max_acreage = max;
        self
    }

    pub fn with_value(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, record: &ParcelRecord) -> bool {
        if let Some(text) = &self.search {
            let text = text.to_lowercase();
            if !record.owner.to_lowercase().contains(&text)
                && !record.parcel_id.to_lowercase().contains(&text)
            {
                return false;
            }
        }

        if let Some(kind) = &self.property_type {
            if record.property_class_desc != *kind {
                return false;
            }
        }

        if let Some(name) = &self.municipality {
            if !record.municipality.eq_ignore_ascii_case(name.trim()) {
                return false;
            }
        }

        within(record.acreage, self.min_acreage, self.max_acreage)
            && within(record.assessed_value, self.min_value, self.max_value)
    }

    pub fn apply<'a>(&self, records: &'a [ParcelRecord]) -> Vec<&'a ParcelRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.map_or(true, |m| value >= m) && max.map_or(true, |m| value <= m)
}

/// Holdings of a single owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerSummary {
    pub owner: String,
    pub parcel_count: usize,
    pub total_acreage: f64,
    pub total_value: f64,
    pub mailing_address: String,
}

/// Groups records by owner name, largest total acreage first.
pub fn summarize_owners<'a, I>(records: I) -> Vec<OwnerSummary>
where
    I: IntoIterator<Item = &'a ParcelRecord>,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut summaries: Vec<OwnerSummary> = Vec::new();

    for record in records {
        let owner = record.owner.trim();
        if owner.is_empty() {
            continue;
        }

        let pos = *index.entry(owner).or_insert_with(|| {
            summaries.push(OwnerSummary {
                owner: owner.to_string(),
                parcel_count: 0,
                total_acreage: 0.0,
                total_value: 0.0,
                mailing_address: record.mailing_address.clone(),
            });
            summaries.len() - 1
        });

        let summary = &mut summaries[pos];
        summary.parcel_count += 1;
        summary.total_acreage += record.acreage;
        summary.total_value += record.assessed_value;
    }

    summaries.sort_by(|a, b| b.total_acreage.total_cmp(&a.total_acreage));
    summaries
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScopeStats {
    pub count: usize,
    pub total_value: f64,
    pub avg_value: f64,
    pub total_acreage: f64,
}

impl ScopeStats {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ParcelRecord>,
    {
        let mut stats = Self::default();
        for record in records {
            stats.count += 1;
            stats.total_value += record.assessed_value;
            stats.total_acreage += record.acreage;
        }
        if stats.count > 0 {
            stats.avg_value = stats.total_value / stats.count as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, owner: &str, acres: f64, value: f64, muni: &str, desc: &str) -> ParcelRecord {
        serde_json::from_value(serde_json::json!({
            "parcel_id": id,
            "owner": owner,
            "acreage": acres,
            "assessed_value": value,
            "municipality": muni,
            "property_class_desc": desc,
            "mailing_address": format!("{} Main St", id),
        }))
        .unwrap()
    }

    fn sample() -> Vec<ParcelRecord> {
        vec![
            record("86.1-1-1", "Smith, John", 5.0, 200000.0, "Hunter", "One Family Residential"),
            record("86.1-1-2", "NYS DEC", 120.0, 50000.0, "Hunter", "State Forest"),
            record("101.2-3-4", "smith, jane", 1.5, 150000.0, "Windham", "One Family Residential"),
            record("101.2-3-5", "NYS DEC", 300.0, 80000.0, "Windham", "State Forest"),
        ]
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let records = sample();
        let filter = ParcelFilter::new().with_search("   ");
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&records).len(), 4);
    }

    #[test]
    fn test_search_owner_or_parcel_id() {
        let records = sample();
        assert_eq!(ParcelFilter::new().with_search("SMITH").apply(&records).len(), 2);
        assert_eq!(ParcelFilter::new().with_search("101.2").apply(&records).len(), 2);
        assert!(ParcelFilter::new().with_search("nobody").apply(&records).is_empty());
    }

    #[test]
    fn test_type_municipality_and_ranges() {
        let records = sample();

        let filter = ParcelFilter::new()
            .with_property_type("State Forest")
            .with_municipality("windham");
        let hits = filter.apply(&records);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].parcel_id, "101.2-3-5");

        // 邊界值包含在內
        let filter = ParcelFilter::new().with_acreage(Some(5.0), Some(120.0));
        assert_eq!(filter.apply(&records).len(), 2);

        let filter = ParcelFilter::new().with_value(None, Some(80000.0));
        assert_eq!(filter.apply(&records).len(), 2);
    }

    #[test]
    fn test_summarize_owners_sorted_by_acreage() {
        let records = sample();
        let owners = summarize_owners(&records);

        assert_eq!(owners.len(), 3);
        assert_eq!(owners[0].owner, "NYS DEC");
        assert_eq!(owners[0].parcel_count, 2);
        assert_eq!(owners[0].total_acreage, 420.0);
        assert_eq!(owners[0].total_value, 130000.0);
        assert_eq!(owners[0].mailing_address, "86.1-1-2 Main St");
        assert_eq!(owners[1].owner, "Smith, John");
    }

    #[test]
    fn test_scope_stats() {
        let stats = ScopeStats::from_records(&sample());
        assert_eq!(stats.count, 4);
        assert_eq!(stats.total_value, 480000.0);
        assert_eq!(stats.avg_value, 120000.0);
        assert_eq!(stats.total_acreage, 426.5);

        assert_eq!(ScopeStats::from_records(&Vec::<ParcelRecord>::new()), ScopeStats::default());
    }
}
