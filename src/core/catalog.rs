//! Static reference data for Greene County parcels: NYS property class
//! codes, municipalities, and the predefined ZIP sub-areas.

pub const DEFAULT_ENDPOINT: &str = "https://services6.arcgis.com/EbVsqZ18sv1kVJ3k/arcgis/rest/services/Greene_County_Tax_Parcels/FeatureServer/0";

pub const DEFAULT_COUNTY: &str = "Greene";

/// Page request pacing; 0 disables it.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 30;

/// Cached data older than this is fetched again; 0 keeps it forever.
pub const DEFAULT_MAX_AGE_HOURS: u64 = 168;

/// A ZIP code area served by a single town's parcel layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub zip: &'static str,
    pub name: &'static str,
    pub town: &'static str,
    pub county: &'static str,
}

pub const AREAS: &[Area] = &[
    Area { zip: "12450", name: "Lanesville", town: "Hunter", county: "Greene" },
    Area { zip: "12442", name: "Hunter", town: "Hunter", county: "Greene" },
    Area { zip: "12485", name: "Tannersville", town: "Hunter", county: "Greene" },
    Area { zip: "12434", name: "Haines Falls", town: "Hunter", county: "Greene" },
    Area { zip: "12424", name: "Elka Park", town: "Hunter", county: "Greene" },
    Area { zip: "12439", name: "Jewett", town: "Jewett", county: "Greene" },
    Area { zip: "12436", name: "Hensonville", town: "Windham", county: "Greene" },
    Area { zip: "12496", name: "Windham", town: "Windham", county: "Greene" },
    Area { zip: "12468", name: "Prattsville", town: "Prattsville", county: "Greene" },
    Area { zip: "12452", name: "Lexington", town: "Lexington", county: "Greene" },
    Area { zip: "12492", name: "West Kill", town: "Lexington", county: "Greene" },
    Area { zip: "12414", name: "Catskill", town: "Catskill", county: "Greene" },
    Area { zip: "12451", name: "Leeds", town: "Catskill", county: "Greene" },
    Area { zip: "12463", name: "Palenville", town: "Catskill", county: "Greene" },
];

pub const MUNICIPALITIES: &[&str] = &[
    "Ashland",
    "Athens",
    "Cairo",
    "Catskill",
    "Coxsackie",
    "Durham",
    "Greenville",
    "Halcott",
    "Hunter",
    "Jewett",
    "Lexington",
    "New Baltimore",
    "Prattsville",
    "Windham",
];

const PROPERTY_CLASSES: &[(&str, &str)] = &[
    ("100", "Agricultural"),
    ("105", "Agricultural Vacant"),
    ("110", "Livestock"),
    ("112", "Dairy Farm"),
    ("113", "Cattle Farm"),
    ("117", "Horse Farm"),
    ("120", "Field Crops"),
    ("200", "Residential"),
    ("210", "One Family Residential"),
    ("220", "Two Family Residential"),
    ("230", "Three Family Residential"),
    ("240", "Rural Residence"),
    ("250", "Estate"),
    ("260", "Seasonal Residence"),
    ("270", "Mobile Home"),
    ("280", "Multiple Residences"),
    ("281", "Multiple Res - 2 to 3 Units"),
    ("283", "Multiple Res - 4 to 6 Units"),
    ("300", "Vacant Land"),
    ("311", "Vacant Land - Residential"),
    ("312", "Vacant Land - Under 10 Acres"),
    ("314", "Vacant Land - Rural"),
    ("322", "Vacant Land - Over 10 Acres"),
    ("323", "Vacant Land - Forest"),
    ("330", "Vacant Land - Commercial"),
    ("340", "Vacant Land - Industrial"),
    ("400", "Commercial"),
    ("411", "Apartments"),
    ("421", "Restaurant"),
    ("422", "Diner/Luncheonette"),
    ("425", "Bar"),
    ("430", "Motel"),
    ("432", "Hotel"),
    ("449", "Other Storage"),
    ("464", "Office Building"),
    ("480", "Multiple Use"),
    ("485", "One Story Small Structure"),
    ("500", "Recreation & Entertainment"),
    ("534", "Social Organization"),
    ("570", "Marina"),
    ("582", "Camping Facility"),
    ("590", "Park"),
    ("600", "Community Service"),
    ("612", "School"),
    ("620", "Religious"),
    ("632", "Health Facility"),
    ("651", "Highway Garage"),
    ("662", "Police/Fire Station"),
    ("700", "Industrial"),
    ("710", "Manufacturing"),
    ("800", "Public Service"),
    ("822", "Water Supply"),
    ("831", "Telephone"),
    ("900", "Wild/Forest/Conservation"),
    ("910", "Private Forest"),
    ("911", "Forest Land - Private"),
    ("920", "State Forest"),
    ("930", "State Owned - Other"),
    ("931", "State Owned - Forest"),
    ("940", "State Reforestation"),
    ("941", "State Land - Reforestation"),
    ("942", "State Land - Wilderness"),
    ("961", "State Owned - Other Agency"),
    ("962", "State Owned - DEC"),
    ("963", "State Park"),
    ("970", "Federal"),
    ("980", "County Land"),
    ("990", "Town Land"),
];

pub fn find_area(zip: &str) -> Option<&'static Area> {
    AREAS.iter().find(|area| area.zip == zip)
}

/// Description for a property class code. Unknown codes fall back to their
/// hundred-level category (`"315"` -> `"300"`), then to `"Unknown"`.
pub fn property_class_description(code: &str) -> &'static str {
    let code = code.trim();
    if let Some(desc) = lookup_class(code) {
        return desc;
    }

    // 部分資料帶有子類別，例如 "210.1"
    let base: String = code.chars().take(3).collect();
    if let Some(desc) = lookup_class(&base) {
        return desc;
    }

    match base.chars().next() {
        Some(first) if first.is_ascii_digit() => {
            lookup_class(&format!("{}00", first)).unwrap_or("Unknown")
        }
        _ => "Unknown",
    }
}

fn lookup_class(code: &str) -> Option<&'static str> {
    PROPERTY_CLASSES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, desc)| *desc)
}
