use std::collections::HashSet;

use sqlx::PgPool;

use crate::db;

/// In-memory record of (rule id, callsign) pairs that already received a
/// notification and are still online. Owned by the airport job; rebuilt from
/// `active_notifications` at startup so a restart does not re-announce
/// controllers that never went offline.
#[derive(Debug, Default)]
pub struct NotifiedCache {
    entries: HashSet<(i64, String)>,
}

impl NotifiedCache {
    pub async fn rehydrate(db: &PgPool) -> Result<Self, sqlx::Error> {
        let pairs = db::get_all_active_rule_callsign_pairs(db).await?;
        Ok(Self::from_pairs(pairs))
    }

    pub fn from_pairs(pairs: Vec<(i64, String)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    pub fn contains(&self, rule_id: i64, callsign: &str) -> bool {
        self.entries.contains(&(rule_id, callsign.to_string()))
    }

    pub fn insert(&mut self, rule_id: i64, callsign: &str) {
        self.entries.insert((rule_id, callsign.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct cached callsigns that are absent from the current snapshot.
    pub fn offline_callsigns(&self, online: &HashSet<&str>) -> Vec<String> {
        let mut gone: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, callsign)| !online.contains(callsign.as_str()))
            .map(|(_, callsign)| callsign.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        gone.sort();
        gone
    }

    /// Prunes the cache to exactly the callsigns still present online.
    pub fn retain_online(&mut self, online: &HashSet<&str>) {
        self.entries
            .retain(|(_, callsign)| online.contains(callsign.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rehydrated() -> NotifiedCache {
        NotifiedCache::from_pairs(vec![
            (7, "KSEA_TWR".to_string()),
            (7, "KSEA_GND".to_string()),
        ])
    }

    #[test]
    fn rehydrated_pairs_are_deduplicating() {
        let cache = rehydrated();
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(7, "KSEA_TWR"));
        assert!(cache.contains(7, "KSEA_GND"));
        assert!(!cache.contains(8, "KSEA_TWR"));
    }

    #[test]
    fn offline_callsigns_ignores_still_online_entries() {
        let cache = rehydrated();
        let online = HashSet::from(["KSEA_TWR"]);
        assert_eq!(cache.offline_callsigns(&online), vec!["KSEA_GND"]);
    }

    #[test]
    fn offline_callsigns_reports_each_callsign_once() {
        let mut cache = rehydrated();
        cache.insert(9, "KSEA_GND");
        let online = HashSet::new();
        assert_eq!(cache.offline_callsigns(&online), vec!["KSEA_GND", "KSEA_TWR"]);
    }

    #[test]
    fn retain_online_prunes_to_current_snapshot() {
        let mut cache = rehydrated();
        let online = HashSet::from(["KSEA_GND"]);
        cache.retain_online(&online);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(7, "KSEA_GND"));
        assert!(!cache.contains(7, "KSEA_TWR"));
    }
}
