//! Records exchanged with a positioning provider.
//!
//! Every record serializes to the camelCase JSON shape handed to scripting
//! clients, so the broker never has to hand-assemble payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// A WGS84 coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `[longitude, latitude]`, the order used for floor plan corners.
    pub fn lng_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Kind of provider-defined area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionType {
    FloorPlan,
    Venue,
    Unknown,
}

/// A geofenced area reported by the provider (a floor plan or a venue)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub region_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    pub region_type: RegionType,
}

impl Region {
    pub fn floor_plan(id: impl Into<String>) -> Self {
        Self {
            region_id: id.into(),
            region_name: None,
            region_type: RegionType::FloorPlan,
        }
    }

    pub fn venue(id: impl Into<String>) -> Self {
        Self {
            region_id: id.into(),
            region_name: None,
            region_type: RegionType::Venue,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.region_name = Some(name.into());
        self
    }
}

/// A single position fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor_level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor_certainty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// Create a fix stamped with the current time.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            altitude: None,
            heading: None,
            floor_level: None,
            floor_certainty: None,
            region: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_floor(mut self, level: i32, certainty: f64) -> Self {
        self.floor_level = Some(level);
        self.floor_certainty = Some(certainty);
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn coordinate(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// Direction of a region transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    Enter,
    Exit,
}

/// Entry into or exit from a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionEvent {
    #[serde(flatten)]
    pub region: Region,
    pub transition_type: Transition,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl RegionEvent {
    pub fn enter(region: Region) -> Self {
        Self {
            region,
            transition_type: Transition::Enter,
            timestamp: Utc::now(),
        }
    }

    pub fn exit(region: Region) -> Self {
        Self {
            region,
            transition_type: Transition::Exit,
            timestamp: Utc::now(),
        }
    }
}

fn serialize_lng_lat<S: Serializer>(point: &LatLng, serializer: S) -> Result<S::Ok, S::Error> {
    point.lng_lat().serialize(serializer)
}

/// Floor plan metadata returned by a resource fetch
///
/// Corners serialize as `[longitude, latitude]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorPlan {
    pub id: String,
    pub name: String,
    pub url: String,
    pub floor_level: i32,
    /// Clockwise rotation from north, in degrees
    pub bearing: f64,
    pub bitmap_width: u32,
    pub bitmap_height: u32,
    pub width_meters: f64,
    pub height_meters: f64,
    pub meters_to_pixels: f64,
    pub pixels_to_meters: f64,
    #[serde(serialize_with = "serialize_lng_lat")]
    pub bottom_left: LatLng,
    #[serde(serialize_with = "serialize_lng_lat")]
    pub center: LatLng,
    #[serde(serialize_with = "serialize_lng_lat")]
    pub top_left: LatLng,
    #[serde(serialize_with = "serialize_lng_lat")]
    pub top_right: LatLng,
}

/// A position forced onto the provider by the client
///
/// At least one of the region and the coordinate is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitPosition {
    region_id: Option<String>,
    coordinate: Option<LatLng>,
}

impl ExplicitPosition {
    /// Build an explicit position, or `None` if neither part is given.
    ///
    /// Region ids are trimmed; a blank id counts as absent.
    pub fn new(region_id: Option<&str>, coordinate: Option<LatLng>) -> Option<Self> {
        let region_id = region_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        if region_id.is_none() && coordinate.is_none() {
            return None;
        }

        Some(Self {
            region_id,
            coordinate,
        })
    }

    pub fn region_id(&self) -> Option<&str> {
        self.region_id.as_deref()
    }

    pub fn coordinate(&self) -> Option<LatLng> {
        self.coordinate
    }
}

/// API key and secret used to construct provider clients
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Platform capabilities positioning depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ChangeWifiState,
    AccessWifiState,
    CoarseLocation,
    FineLocation,
    Internet,
}

impl Capability {
    /// Everything indoor positioning needs.
    pub const ALL: [Capability; 5] = [
        Capability::ChangeWifiState,
        Capability::AccessWifiState,
        Capability::CoarseLocation,
        Capability::FineLocation,
        Capability::Internet,
    ];
}

/// Outcome of a permission prompt for one capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionGrant {
    pub capability: Capability,
    pub granted: bool,
}

impl PermissionGrant {
    pub fn granted(capability: Capability) -> Self {
        Self {
            capability,
            granted: true,
        }
    }

    pub fn denied(capability: Capability) -> Self {
        Self {
            capability,
            granted: false,
        }
    }
}
