//! Command parsing
//!
//! Clients address the broker with an action name and a positional JSON
//! argument array. Parsing is synchronous and total: every malformed request
//! turns into a [`PositionError`] before anything reaches the broker loop, so
//! a rejected command never touches the registry.

use std::time::Duration;

use locus_provider::{Credentials, LatLng};
use serde_json::Value;

use crate::error::{ErrorKind, PositionError};
use crate::types::WatchKind;

/// A validated client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Construct provider clients for these credentials
    Initialize { credentials: Credentials },

    /// Register a named watch, optionally bounded by a timeout
    AddWatch {
        kind: WatchKind,
        watch_id: String,
        timeout: Option<Duration>,
    },

    /// Remove a named watch
    ClearWatch { kind: WatchKind, watch_id: String },

    /// Answer with one location
    GetLocation { timeout: Option<Duration> },

    /// Force the provider's position. Either part may be absent here; the
    /// broker rejects the command when both are.
    SetPosition {
        region_id: Option<String>,
        coordinate: Option<LatLng>,
    },

    /// Fetch floor plan metadata, cancelling any fetch in flight
    FetchFloorPlan { floor_plan_id: String },

    /// Check and, if needed, prompt for platform capabilities
    GetPermissions,
}

impl Command {
    /// Parse an action name and its positional arguments.
    ///
    /// `args` may be a JSON array or `null` (no arguments).
    pub fn parse(action: &str, args: &Value) -> Result<Command, PositionError> {
        let args = Args::new(args)?;

        match action {
            "initialize" => {
                let api_key = args.string(0, "apiKey")?.trim();
                let api_secret = args.string(1, "apiSecret")?.trim();
                if api_key.is_empty() || api_secret.is_empty() {
                    return Err(PositionError::new(ErrorKind::InvalidCredentials));
                }
                Ok(Command::Initialize {
                    credentials: Credentials::new(api_key, api_secret),
                })
            }
            "addWatch" | "addRegionWatch" => Ok(Command::AddWatch {
                kind: watch_kind(action),
                watch_id: args.string(0, "watchId")?.to_string(),
                timeout: args.timeout(1)?,
            }),
            "clearWatch" | "clearRegionWatch" => Ok(Command::ClearWatch {
                kind: watch_kind(action),
                watch_id: args.string(0, "watchId")?.to_string(),
            }),
            "getLocation" => Ok(Command::GetLocation {
                timeout: args.timeout(0)?,
            }),
            "setPosition" => Ok(Command::SetPosition {
                region_id: args.optional_string(0, "regionId")?,
                coordinate: args.coordinate(1)?,
            }),
            "fetchFloorPlan" => Ok(Command::FetchFloorPlan {
                floor_plan_id: args.string(0, "floorPlanId")?.to_string(),
            }),
            "getPermissions" => Ok(Command::GetPermissions),
            other => Err(PositionError::invalid_arguments(format!(
                "Unknown action: {other}"
            ))),
        }
    }

    /// Action name this command was parsed from.
    pub fn action(&self) -> &'static str {
        match self {
            Command::Initialize { .. } => "initialize",
            Command::AddWatch {
                kind: WatchKind::Position,
                ..
            } => "addWatch",
            Command::AddWatch {
                kind: WatchKind::Region,
                ..
            } => "addRegionWatch",
            Command::ClearWatch {
                kind: WatchKind::Position,
                ..
            } => "clearWatch",
            Command::ClearWatch {
                kind: WatchKind::Region,
                ..
            } => "clearRegionWatch",
            Command::GetLocation { .. } => "getLocation",
            Command::SetPosition { .. } => "setPosition",
            Command::FetchFloorPlan { .. } => "fetchFloorPlan",
            Command::GetPermissions => "getPermissions",
        }
    }
}

fn watch_kind(action: &str) -> WatchKind {
    if action.contains("Region") {
        WatchKind::Region
    } else {
        WatchKind::Position
    }
}

/// Positional argument accessor.
struct Args<'a> {
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn new(args: &'a Value) -> Result<Self, PositionError> {
        match args {
            Value::Array(values) => Ok(Self { values }),
            Value::Null => Ok(Self { values: &[] }),
            _ => Err(PositionError::invalid_arguments(
                "Arguments must be a JSON array",
            )),
        }
    }

    /// Argument at `index`, with JSON `null` treated as absent.
    fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index).filter(|value| !value.is_null())
    }

    fn string(&self, index: usize, name: &str) -> Result<&'a str, PositionError> {
        match self.get(index) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(PositionError::invalid_arguments(format!(
                "{name} must be a string"
            ))),
            None => Err(PositionError::invalid_arguments(format!(
                "Missing argument {name}"
            ))),
        }
    }

    /// A string that may be missing or blank.
    fn optional_string(&self, index: usize, name: &str) -> Result<Option<String>, PositionError> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Some(_) => Err(PositionError::invalid_arguments(format!(
                "{name} must be a string"
            ))),
        }
    }

    /// Optional timeout in milliseconds; must be a positive integer when given.
    fn timeout(&self, index: usize) -> Result<Option<Duration>, PositionError> {
        let Some(value) = self.get(index) else {
            return Ok(None);
        };
        match value.as_u64() {
            Some(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
            _ => Err(PositionError::invalid_arguments(
                "timeoutMs must be a positive integer",
            )),
        }
    }

    /// `[latitude, longitude]`. Arrays of any other length mean "no coordinate".
    fn coordinate(&self, index: usize) -> Result<Option<LatLng>, PositionError> {
        let Some(value) = self.get(index) else {
            return Ok(None);
        };
        let Value::Array(pair) = value else {
            return Err(PositionError::invalid_arguments(
                "Coordinate must be an array",
            ));
        };
        if pair.len() != 2 {
            return Ok(None);
        }
        match (pair[0].as_f64(), pair[1].as_f64()) {
            (Some(latitude), Some(longitude)) => Ok(Some(LatLng::new(latitude, longitude))),
            _ => Err(PositionError::invalid_arguments(
                "Coordinate must contain two numbers",
            )),
        }
    }
}
