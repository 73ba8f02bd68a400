use crate::domain::model::ParcelRecord;
use crate::utils::error::{ParcelError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Zip,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Zip => "zip",
        }
    }
}

/// CSV row; the boundary ring is reduced to its centroid.
#[derive(Serialize)]
struct CsvRow<'a> {
    parcel_id: &'a str,
    sbl: &'a str,
    owner: &'a str,
    mailing_address: &'a str,
    mailing_city: &'a str,
    mailing_state: &'a str,
    mailing_zip: &'a str,
    property_class: &'a str,
    property_class_desc: &'a str,
    acreage: f64,
    assessed_value: f64,
    land_value: f64,
    improvement_value: f64,
    municipality: &'a str,
    county: &'a str,
    school_district: &'a str,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl<'a> From<&'a ParcelRecord> for CsvRow<'a> {
    fn from(r: &'a ParcelRecord) -> Self {
        Self {
            parcel_id: &r.parcel_id,
            sbl: &r.sbl,
            owner: &r.owner,
            mailing_address: &r.mailing_address,
            mailing_city: &r.mailing_city,
            mailing_state: &r.mailing_state,
            mailing_zip: &r.mailing_zip,
            property_class: &r.property_class,
            property_class_desc: &r.property_class_desc,
            acreage: r.acreage,
            assessed_value: r.assessed_value,
            land_value: r.land_value,
            improvement_value: r.improvement_value,
            municipality: &r.municipality,
            county: &r.county,
            school_district: &r.school_district,
            latitude: r.latitude,
            longitude: r.longitude,
        }
    }
}

pub fn to_csv(records: &[&ParcelRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(CsvRow::from(*record))?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| ParcelError::IoError(e.into_error()))
}

pub fn to_json(records: &[&ParcelRecord]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(records)?)
}

pub fn export(records: &[&ParcelRecord], format: ExportFormat) -> Result<Vec<u8>> {
    let data = match format {
        ExportFormat::Csv => to_csv(records)?,
        ExportFormat::Json => to_json(records)?,
        ExportFormat::Zip => {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            zip.start_file::<_, ()>("parcels.csv", FileOptions::default())?;
            zip.write_all(&to_csv(records)?)?;

            zip.start_file::<_, ()>("parcels.json", FileOptions::default())?;
            zip.write_all(&to_json(records)?)?;

            let cursor = zip.finish()?;
            cursor.into_inner()
        }
    };

    tracing::debug!("Exported {} record(s) as {} ({} bytes)", records.len(), format.extension(), data.len());
    Ok(data)
}
