use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DATAFEED_URL: &str = "https://data.vatsim.net/v3/vatsim-data.json";

/// One point-in-time read of the VATSIM v3 data feed. The feed carries more
/// top-level arrays (servers, prefiles, facilities) than we consume; serde
/// drops the rest.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatafeedRoot {
    pub general: General,
    pub pilots: Vec<Pilot>,
    pub controllers: Vec<Controller>,
    pub atis: Vec<Atis>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct General {
    pub version: i32,
    pub update_timestamp: DateTime<Utc>,
    pub connected_clients: i32,
    pub unique_users: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Controller {
    pub cid: i64,
    pub name: String,
    pub callsign: String,
    pub frequency: String,
    pub facility: i16,
    pub rating: i16,
    pub server: String,
    pub visual_range: i32,
    pub text_atis: Option<Vec<String>>,
    pub last_updated: DateTime<Utc>,
    pub logon_time: DateTime<Utc>,
}

/// ATIS stations are structurally controllers with an ATIS letter attached.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Atis {
    pub cid: i64,
    pub name: String,
    pub callsign: String,
    pub frequency: String,
    pub atis_code: Option<String>,
    pub text_atis: Option<Vec<String>>,
    pub last_updated: DateTime<Utc>,
    pub logon_time: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Pilot {
    pub cid: i64,
    pub name: String,
    pub callsign: String,
    pub server: String,
    pub pilot_rating: i16,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: i32,
    pub groundspeed: i32,
    pub transponder: String,
    pub heading: i32,
    pub flight_plan: Option<FlightPlan>,
    pub last_updated: DateTime<Utc>,
    pub logon_time: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FlightPlan {
    pub flight_rules: String,
    pub aircraft: String,
    pub aircraft_short: String,
    pub departure: String,
    pub arrival: String,
    pub alternate: String,
    pub cruise_tas: String,
    pub altitude: String,
    pub route: String,
    pub remarks: String,
}
