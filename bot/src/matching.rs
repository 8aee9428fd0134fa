use shared::vatsim::datafeed::{Atis, Controller, DatafeedRoot};

use crate::cache::NotifiedCache;
use crate::db::NotificationRule;

/// Placeholder frequencies used by non-operational connections.
pub const RESERVED_FREQUENCIES: [&str; 3] = ["199.998", "199.997", "199.999"];

const NON_TERMINAL_MARKERS: [&str; 3] = ["_APP", "_DEP", "_CTR"];

/// Equivalence set for an airport/position identifier: the identifier itself,
/// its 3-letter form when it is a 4-letter code, and its "K"-prefixed form
/// when it is a 3-letter code. Matching and ATIS association both use it.
pub fn identifier_variants(identifier: &str) -> Vec<String> {
    let id = identifier.to_ascii_uppercase();
    let mut variants = vec![id.clone()];
    if id.len() == 4 {
        variants.push(id[1..].to_string());
    } else if id.len() == 3 {
        variants.push(format!("K{id}"));
    }
    variants
}

fn is_excluded(controller: &Controller) -> bool {
    controller.callsign.to_ascii_uppercase().contains("OBS")
        || RESERVED_FREQUENCIES.contains(&controller.frequency.as_str())
}

fn callsign_prefix(callsign: &str) -> &str {
    callsign.split('_').next().unwrap_or(callsign)
}

/// All controllers a rule newly matches in this snapshot, one entry per rule
/// so simultaneous positions produce a single combined notification.
#[derive(Debug)]
pub struct RuleMatch<'a> {
    pub rule: &'a NotificationRule,
    pub controllers: Vec<&'a Controller>,
}

pub fn match_rules<'a>(
    feed: &'a DatafeedRoot,
    rules: &'a [NotificationRule],
    seen: &NotifiedCache,
) -> Vec<RuleMatch<'a>> {
    let mut matches = Vec::new();

    for rule in rules {
        let variants = identifier_variants(&rule.airport_icao);
        let mut controllers: Vec<&Controller> = feed
            .controllers
            .iter()
            .filter(|c| !is_excluded(c))
            .filter(|c| variants.iter().any(|v| v == callsign_prefix(&c.callsign)))
            .filter(|c| !seen.contains(rule.id, &c.callsign))
            .collect();

        if controllers.is_empty() {
            continue;
        }

        controllers.sort_by(|a, b| a.callsign.cmp(&b.callsign));
        matches.push(RuleMatch { rule, controllers });
    }

    matches
}

/// ATIS association for a combined notification.
#[derive(Debug)]
pub enum AtisReport<'a> {
    Active(Vec<&'a Atis>),
    /// No ATIS online, and every matched controller works a position that
    /// does not carry one (approach/departure/center).
    NonTerminalOnly,
    NotFound,
}

/// ATIS stations whose callsign starts with any variant of the identifier,
/// sorted by callsign.
pub fn matching_atis<'a>(feed: &'a DatafeedRoot, identifier: &str) -> Vec<&'a Atis> {
    let variants = identifier_variants(identifier);
    let mut stations: Vec<&Atis> = feed
        .atis
        .iter()
        .filter(|a| variants.iter().any(|v| a.callsign.starts_with(v.as_str())))
        .collect();
    stations.sort_by(|a, b| a.callsign.cmp(&b.callsign));
    stations
}

pub fn atis_report<'a>(
    feed: &'a DatafeedRoot,
    identifier: &str,
    controllers: &[&Controller],
) -> AtisReport<'a> {
    let stations = matching_atis(feed, identifier);
    if !stations.is_empty() {
        return AtisReport::Active(stations);
    }

    let non_terminal_only = controllers.iter().all(|c| {
        NON_TERMINAL_MARKERS
            .iter()
            .any(|marker| c.callsign.contains(marker))
    });

    if non_terminal_only {
        AtisReport::NonTerminalOnly
    } else {
        AtisReport::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::vatsim::datafeed::General;

    fn controller(callsign: &str, frequency: &str) -> Controller {
        Controller {
            cid: 1_000_000,
            name: "Test Controller".to_string(),
            callsign: callsign.to_string(),
            frequency: frequency.to_string(),
            facility: 4,
            rating: 3,
            server: "USA-WEST".to_string(),
            visual_range: 50,
            text_atis: None,
            last_updated: Utc::now(),
            logon_time: Utc::now(),
        }
    }

    fn atis(callsign: &str) -> Atis {
        Atis {
            cid: 1_000_001,
            name: "Atis".to_string(),
            callsign: callsign.to_string(),
            frequency: "118.000".to_string(),
            atis_code: Some("A".to_string()),
            text_atis: Some(vec!["INFO A".to_string()]),
            last_updated: Utc::now(),
            logon_time: Utc::now(),
        }
    }

    fn feed(controllers: Vec<Controller>, atis: Vec<Atis>) -> DatafeedRoot {
        DatafeedRoot {
            general: General {
                version: 3,
                update_timestamp: Utc::now(),
                connected_clients: 0,
                unique_users: 0,
            },
            pilots: Vec::new(),
            controllers,
            atis,
        }
    }

    fn rule(id: i64, identifier: &str) -> NotificationRule {
        NotificationRule {
            id,
            guild_id: 100,
            airport_icao: identifier.to_string(),
            channel_id: 200,
            role_id: None,
            delete_on_offline: false,
        }
    }

    #[test]
    fn four_letter_k_identifier_matches_both_forms() {
        let variants = identifier_variants("KSEA");
        assert_eq!(variants, vec!["KSEA".to_string(), "SEA".to_string()]);

        let feed = feed(
            vec![controller("KSEA_TWR", "119.900"), controller("SEA_GND", "121.700")],
            vec![],
        );
        let rules = [rule(1, "KSEA")];
        let matches = match_rules(&feed, &rules, &NotifiedCache::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].controllers.len(), 2);
    }

    #[test]
    fn three_letter_identifier_matches_k_prefixed_callsign() {
        let feed = feed(vec![controller("KORD_TWR", "120.750")], vec![]);
        let rules = [rule(1, "ORD")];
        let matches = match_rules(&feed, &rules, &NotifiedCache::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].controllers[0].callsign, "KORD_TWR");
    }

    #[test]
    fn reserved_frequency_never_matches() {
        for freq in RESERVED_FREQUENCIES {
            let feed = feed(vec![controller("ORD_TWR", freq)], vec![]);
            let rules = [rule(1, "ORD")];
            assert!(match_rules(&feed, &rules, &NotifiedCache::default()).is_empty());
        }
    }

    #[test]
    fn observers_never_match() {
        let feed = feed(vec![controller("ORD_OBS", "199.998"), controller("ORD_obs", "122.800")], vec![]);
        let rules = [rule(1, "ORD")];
        assert!(match_rules(&feed, &rules, &NotifiedCache::default()).is_empty());
    }

    #[test]
    fn simultaneous_positions_group_into_one_sorted_match() {
        let feed = feed(
            vec![
                controller("ORD_TWR", "120.750"),
                controller("ORD_GND", "121.750"),
                controller("ORD_APP", "119.000"),
            ],
            vec![],
        );
        let rules = [rule(1, "ORD")];
        let matches = match_rules(&feed, &rules, &NotifiedCache::default());
        assert_eq!(matches.len(), 1);
        let callsigns: Vec<&str> = matches[0]
            .controllers
            .iter()
            .map(|c| c.callsign.as_str())
            .collect();
        assert_eq!(callsigns, vec!["ORD_APP", "ORD_GND", "ORD_TWR"]);
    }

    #[test]
    fn cached_pairs_are_not_rematched() {
        let feed = feed(
            vec![controller("ORD_TWR", "120.750"), controller("ORD_GND", "121.750")],
            vec![],
        );
        let rules = [rule(1, "ORD")];
        let mut seen = NotifiedCache::default();
        seen.insert(1, "ORD_TWR");

        let matches = match_rules(&feed, &rules, &seen);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].controllers.len(), 1);
        assert_eq!(matches[0].controllers[0].callsign, "ORD_GND");

        seen.insert(1, "ORD_GND");
        assert!(match_rules(&feed, &rules, &seen).is_empty());
    }

    #[test]
    fn dedup_is_per_rule() {
        let feed = feed(vec![controller("ORD_TWR", "120.750")], vec![]);
        let rules = [rule(1, "ORD"), rule(2, "ORD")];
        let mut seen = NotifiedCache::default();
        seen.insert(1, "ORD_TWR");

        let matches = match_rules(&feed, &rules, &seen);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rule.id, 2);
    }

    #[test]
    fn atis_association_uses_identifier_variants() {
        let feed = feed(vec![controller("SEA_TWR", "119.900")], vec![atis("KSEA_ATIS")]);
        let controllers = [&feed.controllers[0]];
        match atis_report(&feed, "SEA", &controllers) {
            AtisReport::Active(stations) => {
                assert_eq!(stations.len(), 1);
                assert_eq!(stations[0].callsign, "KSEA_ATIS");
            }
            other => panic!("expected active ATIS, got {other:?}"),
        }
    }

    #[test]
    fn non_terminal_positions_report_no_dedicated_atis() {
        let feed = feed(
            vec![controller("CHI_APP", "133.500"), controller("ZAU_CTR", "125.000")],
            vec![],
        );
        let controllers: Vec<&Controller> = feed.controllers.iter().collect();
        assert!(matches!(
            atis_report(&feed, "CHI", &controllers),
            AtisReport::NonTerminalOnly
        ));
    }

    #[test]
    fn terminal_position_without_atis_reports_not_found() {
        let feed = feed(vec![controller("ORD_TWR", "120.750")], vec![]);
        let controllers = [&feed.controllers[0]];
        assert!(matches!(
            atis_report(&feed, "ORD", &controllers),
            AtisReport::NotFound
        ));
    }
}
