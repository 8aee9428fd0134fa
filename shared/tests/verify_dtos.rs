use shared::vatsim::datafeed::{DATAFEED_URL, DatafeedRoot};

const SAMPLE_DATAFEED: &str = r#"{
    "general": {
        "version": 3,
        "reload": 1,
        "update": "20240605181634",
        "update_timestamp": "2024-06-05T18:16:34.1122334Z",
        "connected_clients": 3,
        "unique_users": 3
    },
    "pilots": [
        {
            "cid": 1300001,
            "name": "Jane Doe KSEA",
            "callsign": "ASA123",
            "server": "USA-WEST",
            "pilot_rating": 1,
            "military_rating": 0,
            "latitude": 47.44,
            "longitude": -122.3,
            "altitude": 34997,
            "groundspeed": 441,
            "transponder": "2000",
            "heading": 177,
            "qnh_i_hg": 29.92,
            "qnh_mb": 1013,
            "flight_plan": {
                "flight_rules": "I",
                "aircraft": "B738/M-VGDW/C",
                "aircraft_faa": "B738/L",
                "aircraft_short": "B738",
                "departure": "KSEA",
                "arrival": "KLAX",
                "alternate": "KONT",
                "cruise_tas": "454",
                "altitude": "35000",
                "deptime": "1730",
                "enroute_time": "0225",
                "fuel_time": "0400",
                "remarks": "/V/",
                "route": "SUMMA2 SUMMA Q1 FLW SADDE6"
            },
            "logon_time": "2024-06-05T17:28:01.0000000Z",
            "last_updated": "2024-06-05T18:16:32.0000000Z"
        }
    ],
    "controllers": [
        {
            "cid": 1200001,
            "name": "John Smith",
            "callsign": "SEA_TWR",
            "frequency": "119.900",
            "facility": 4,
            "rating": 3,
            "server": "USA-WEST",
            "visual_range": 50,
            "text_atis": ["Seattle Tower", "Expect runway 16L"],
            "last_updated": "2024-06-05T18:16:30.0000000Z",
            "logon_time": "2024-06-05T16:02:11.0000000Z"
        }
    ],
    "atis": [
        {
            "cid": 1200002,
            "name": "Atis Bot",
            "callsign": "KSEA_ATIS",
            "frequency": "118.000",
            "facility": 4,
            "rating": 1,
            "server": "USA-WEST",
            "visual_range": 0,
            "atis_code": "F",
            "text_atis": ["KSEA ATIS INFO F 1753Z"],
            "last_updated": "2024-06-05T18:16:12.0000000Z",
            "logon_time": "2024-06-05T12:00:00.0000000Z"
        }
    ]
}"#;

#[test]
fn deserialize_sample_datafeed() {
    let feed: DatafeedRoot = serde_json::from_str(SAMPLE_DATAFEED).expect("sample should parse");

    assert_eq!(feed.general.connected_clients, 3);
    assert_eq!(feed.controllers.len(), 1);
    assert_eq!(feed.controllers[0].callsign, "SEA_TWR");
    assert_eq!(feed.controllers[0].frequency, "119.900");
    assert_eq!(feed.controllers[0].cid, 1_200_001);

    assert_eq!(feed.atis[0].atis_code.as_deref(), Some("F"));

    let pilot = &feed.pilots[0];
    assert_eq!(pilot.altitude, 34997);
    let plan = pilot.flight_plan.as_ref().expect("pilot filed a plan");
    assert_eq!(plan.departure, "KSEA");
    assert_eq!(plan.arrival, "KLAX");
    assert_eq!(plan.aircraft_short, "B738");
}

#[test]
fn flight_plan_is_optional() {
    let mut value: serde_json::Value = serde_json::from_str(SAMPLE_DATAFEED).unwrap();
    value["pilots"][0]["flight_plan"] = serde_json::Value::Null;
    let feed: DatafeedRoot = serde_json::from_value(value).expect("null flight plan should parse");
    assert!(feed.pilots[0].flight_plan.is_none());
}

#[tokio::test]
#[ignore = "hits the live VATSIM endpoint"]
async fn verify_datafeed_dtos() -> Result<(), reqwest::Error> {
    let res = reqwest::get(DATAFEED_URL)
        .await?
        .json::<DatafeedRoot>()
        .await?;
    assert!(res.general.connected_clients >= 0);
    Ok(())
}
