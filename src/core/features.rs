use crate::core::catalog;
use crate::domain::model::ParcelRecord;
use crate::utils::error::ParcelError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// A raw feature from an ArcGIS `query` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Polygon rings of `[x, y]` (`[lon, lat]` in WGS84) points
    #[serde(default)]
    pub rings: Vec<Vec<[f64; 2]>>,
}

/// ArcGIS 錯誤格式：HTTP 200 但內容帶 `error`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceFault {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
}

impl From<ServiceFault> for ParcelError {
    fn from(fault: ServiceFault) -> Self {
        let mut message = if fault.message.is_empty() {
            "unknown service error".to_string()
        } else {
            fault.message
        };
        if let Some(code) = fault.code {
            message = format!("{} (code {})", message, code);
        }
        if !fault.details.is_empty() {
            message = format!("{}: {}", message, fault.details.join("; "));
        }
        // 錯誤內容屬於服務端拒絕，不重試
        ParcelError::service(None, message)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default, rename = "exceededTransferLimit")]
    pub exceeded_transfer_limit: Option<bool>,
    #[serde(default)]
    pub error: Option<ServiceFault>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountResponse {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub error: Option<ServiceFault>,
}

/// Logical parcel fields that are read from feature attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParcelField {
    ParcelId,
    Sbl,
    Owner,
    MailingAddress,
    MailingCity,
    MailingState,
    MailingZip,
    PropertyClass,
    Acreage,
    AssessedValue,
    LandValue,
    ImprovementValue,
    Municipality,
    SchoolDistrict,
}

impl ParcelField {
    pub const ALL: [ParcelField; 14] = [
        Self::ParcelId,
        Self::Sbl,
        Self::Owner,
        Self::MailingAddress,
        Self::MailingCity,
        Self::MailingState,
        Self::MailingZip,
        Self::PropertyClass,
        Self::Acreage,
        Self::AssessedValue,
        Self::LandValue,
        Self::ImprovementValue,
        Self::Municipality,
        Self::SchoolDistrict,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ParcelId => "parcel_id",
            Self::Sbl => "sbl",
            Self::Owner => "owner",
            Self::MailingAddress => "mailing_address",
            Self::MailingCity => "mailing_city",
            Self::MailingState => "mailing_state",
            Self::MailingZip => "mailing_zip",
            Self::PropertyClass => "property_class",
            Self::Acreage => "acreage",
            Self::AssessedValue => "assessed_value",
            Self::LandValue => "land_value",
            Self::ImprovementValue => "improvement_value",
            Self::Municipality => "municipality",
            Self::SchoolDistrict => "school_district",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Attribute names seen across county and NYS parcel layers.
    pub fn default_aliases(self) -> &'static [&'static str] {
        match self {
            Self::ParcelId => &["PRINT_KEY", "PARCEL_ID", "PARCELID"],
            Self::Sbl => &["SBL", "SWIS_SBL_ID"],
            Self::Owner => &["OWNER", "OWNER_NAME1", "PRIMARY_OWNER"],
            Self::MailingAddress => &["MAIL_ADDR"],
            Self::MailingCity => &["MAIL_CITY"],
            Self::MailingState => &["MAIL_STATE"],
            Self::MailingZip => &["MAIL_ZIP"],
            Self::PropertyClass => &["PROP_CLASS"],
            Self::Acreage => &["ACRES", "CALC_ACRES"],
            Self::AssessedValue => &["TOTAL_AV"],
            Self::LandValue => &["LAND_AV"],
            Self::ImprovementValue => &["IMPR_AV", "IMPROVEMENT_AV"],
            Self::Municipality => &["MUNI_NAME", "CITYTOWN_NAME"],
            Self::SchoolDistrict => &["SCH_NAME", "SCHOOL_NAME", "SCHOOL_DIST"],
        }
    }
}

/// Resolves logical fields to attribute names. Configured overrides are
/// tried before the default aliases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    overrides: HashMap<ParcelField, String>,
}

impl FieldMap {
    /// Builds a map from `field name -> attribute` pairs, as found in the
    /// `[fields]` config table.
    pub fn from_overrides(pairs: &HashMap<String, String>) -> crate::utils::error::Result<Self> {
        let mut overrides = HashMap::new();
        for (name, attribute) in pairs {
            let field = ParcelField::from_name(name).ok_or_else(|| {
                ParcelError::InvalidConfigValueError {
                    field: format!("fields.{}", name),
                    value: attribute.clone(),
                    reason: "unknown parcel field".to_string(),
                }
            })?;
            overrides.insert(field, attribute.clone());
        }
        Ok(Self { overrides })
    }

    pub fn with_override(mut self, field: ParcelField, attribute: impl Into<String>) -> Self {
        self.overrides.insert(field, attribute.into());
        self
    }

    pub fn candidates(&self, field: ParcelField) -> Vec<&str> {
        let mut names = Vec::with_capacity(4);
        if let Some(name) = self.overrides.get(&field) {
            names.push(name.as_str());
        }
        names.extend(field.default_aliases().iter().copied());
        names
    }

    /// Attribute used in `where` clauses and distinct-value queries.
    pub fn municipality_attribute(&self) -> &str {
        self.overrides
            .get(&ParcelField::Municipality)
            .map(String::as_str)
            .unwrap_or(ParcelField::Municipality.default_aliases()[0])
    }

    pub fn text(&self, attrs: &Map<String, Value>, field: ParcelField) -> String {
        self.candidates(field)
            .into_iter()
            .find_map(|key| match attrs.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn number(&self, attrs: &Map<String, Value>, field: ParcelField) -> Option<f64> {
        self.candidates(field)
            .into_iter()
            .find_map(|key| match attrs.get(key) {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
                _ => None,
            })
    }
}

/// Converts features into parcel records, dropping features without an
/// identifier and keeping the first occurrence of duplicated identifiers.
pub fn process_features(features: Vec<Feature>, fields: &FieldMap, county: &str) -> Vec<ParcelRecord> {
    let mut seen = HashSet::with_capacity(features.len());
    let mut records = Vec::with_capacity(features.len());
    let mut missing_id = 0usize;
    let mut duplicates = 0usize;

    for feature in features {
        let Some(record) = to_record(&feature, fields, county) else {
            missing_id += 1;
            continue;
        };

        if !seen.insert(record.parcel_id.clone()) {
            duplicates += 1;
            continue;
        }
        records.push(record);
    }

    if missing_id > 0 {
        tracing::warn!("⚠️ Skipped {} feature(s) without a parcel identifier", missing_id);
    }
    if duplicates > 0 {
        tracing::warn!("⚠️ Dropped {} duplicated parcel identifier(s)", duplicates);
    }

    records
}

pub fn to_record(feature: &Feature, fields: &FieldMap, county: &str) -> Option<ParcelRecord> {
    let attrs = &feature.attributes;
    let parcel_id = fields.text(attrs, ParcelField::ParcelId);
    if parcel_id.is_empty() {
        return None;
    }

    let property_class = fields.text(attrs, ParcelField::PropertyClass);
    let assessed_value = fields.number(attrs, ParcelField::AssessedValue).unwrap_or(0.0);
    let land_value = fields.number(attrs, ParcelField::LandValue).unwrap_or(0.0);
    // 沒有改良物價值欄位時以總評估值減土地評估值推算
    let improvement_value = fields
        .number(attrs, ParcelField::ImprovementValue)
        .unwrap_or_else(|| (assessed_value - land_value).max(0.0));

    let coordinates = feature
        .geometry
        .as_ref()
        .and_then(|g| g.rings.first())
        .map(|ring| ring.iter().map(|[x, y]| [*y, *x]).collect::<Vec<_>>())
        .unwrap_or_default();
    let centroid = centroid(&coordinates);

    Some(ParcelRecord {
        parcel_id,
        sbl: fields.text(attrs, ParcelField::Sbl),
        owner: fields.text(attrs, ParcelField::Owner),
        mailing_address: fields.text(attrs, ParcelField::MailingAddress),
        mailing_city: fields.text(attrs, ParcelField::MailingCity),
        mailing_state: fields.text(attrs, ParcelField::MailingState),
        mailing_zip: fields.text(attrs, ParcelField::MailingZip),
        property_class_desc: catalog::property_class_description(&property_class).to_string(),
        property_class,
        acreage: fields.number(attrs, ParcelField::Acreage).unwrap_or(0.0),
        assessed_value,
        land_value,
        improvement_value,
        municipality: fields.text(attrs, ParcelField::Municipality),
        county: county.to_string(),
        school_district: fields.text(attrs, ParcelField::SchoolDistrict),
        latitude: centroid.map(|c| c[0]),
        longitude: centroid.map(|c| c[1]),
        coordinates,
    })
}

/// Vertex mean of a ring, ignoring the closing vertex when it repeats the first.
pub fn centroid(ring: &[[f64; 2]]) -> Option<[f64; 2]> {
    let points = match ring {
        [] => return None,
        [first, .., last] if first == last => &ring[..ring.len() - 1],
        _ => ring,
    };

    let n = points.len() as f64;
    let (lat, lon) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p[0], lon + p[1]));
    Some([lat / n, lon / n])
}
