use sqlx::PgPool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRule {
    pub id: i64,
    pub guild_id: i64,
    pub airport_icao: String,
    pub channel_id: i64,
    pub role_id: Option<i64>,
    pub delete_on_offline: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActiveNotification {
    pub id: i64,
    pub rule_id: i64,
    pub message_id: i64,
    pub channel_id: i64,
    pub callsign: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tracker {
    pub id: i64,
    pub guild_id: i64,
    pub channel_id: i64,
    pub message_id: Option<i64>,
    pub vatsim_cid: i64,
    pub delete_on_offline: bool,
    pub role_id: Option<i64>,
    pub ping_sent: bool,
}

/// Pilot and controller trackers share one schema across two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerKind {
    Flight,
    Controller,
}

impl TrackerKind {
    pub const fn table(self) -> &'static str {
        match self {
            Self::Flight => "flight_trackers",
            Self::Controller => "controller_trackers",
        }
    }

    pub const fn noun(self) -> &'static str {
        match self {
            Self::Flight => "pilot",
            Self::Controller => "controller",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Flight => "Flight",
            Self::Controller => "Controller",
        }
    }
}

pub async fn add_notification(
    db: &PgPool,
    guild_id: i64,
    airport_icao: &str,
    channel_id: i64,
    role_id: Option<i64>,
    delete_on_offline: bool,
) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        r"
        INSERT INTO notifications (guild_id, airport_icao, channel_id, role_id, delete_on_offline)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        ",
    )
    .bind(guild_id)
    .bind(airport_icao)
    .bind(channel_id)
    .bind(role_id)
    .bind(delete_on_offline)
    .fetch_one(db)
    .await?;
    Ok(id)
}

pub async fn notification_exists(
    db: &PgPool,
    guild_id: i64,
    airport_icao: &str,
    channel_id: i64,
    role_id: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) = sqlx::query_as(
        r"
        SELECT EXISTS (
            SELECT 1 FROM notifications
            WHERE guild_id = $1
              AND airport_icao = $2
              AND channel_id = $3
              AND role_id IS NOT DISTINCT FROM $4
        )
        ",
    )
    .bind(guild_id)
    .bind(airport_icao)
    .bind(channel_id)
    .bind(role_id)
    .fetch_one(db)
    .await?;
    Ok(exists)
}

pub async fn get_all_notifications(db: &PgPool) -> Result<Vec<NotificationRule>, sqlx::Error> {
    sqlx::query_as(
        r"
        SELECT id, guild_id, airport_icao, channel_id, role_id, delete_on_offline
        FROM notifications
        ORDER BY id
        ",
    )
    .fetch_all(db)
    .await
}

pub async fn get_notifications_by_guild(
    db: &PgPool,
    guild_id: i64,
) -> Result<Vec<NotificationRule>, sqlx::Error> {
    sqlx::query_as(
        r"
        SELECT id, guild_id, airport_icao, channel_id, role_id, delete_on_offline
        FROM notifications
        WHERE guild_id = $1
        ORDER BY id
        ",
    )
    .bind(guild_id)
    .fetch_all(db)
    .await
}

/// Guild-scoped so one guild cannot remove another guild's rule.
pub async fn remove_notification(
    db: &PgPool,
    rule_id: i64,
    guild_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND guild_id = $2")
        .bind(rule_id)
        .bind(guild_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

/// Records every callsign of a delivered notification in one transaction, so
/// a crash mid-cycle never leaves a partially recorded group.
pub async fn add_active_notifications(
    db: &PgPool,
    rule_id: i64,
    message_id: i64,
    channel_id: i64,
    callsigns: &[&str],
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;
    for callsign in callsigns {
        sqlx::query(
            r"
            INSERT INTO active_notifications (rule_id, message_id, channel_id, callsign)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (callsign) DO NOTHING
            ",
        )
        .bind(rule_id)
        .bind(message_id)
        .bind(channel_id)
        .bind(callsign)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

pub async fn get_active_notification_by_callsign(
    db: &PgPool,
    callsign: &str,
) -> Result<Option<ActiveNotification>, sqlx::Error> {
    sqlx::query_as(
        r"
        SELECT id, rule_id, message_id, channel_id, callsign
        FROM active_notifications
        WHERE callsign = $1
        ",
    )
    .bind(callsign)
    .fetch_optional(db)
    .await
}

pub async fn remove_active_notification_by_callsign(
    db: &PgPool,
    callsign: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM active_notifications WHERE callsign = $1")
        .bind(callsign)
        .execute(db)
        .await
        .map(|_| ())
}

/// Rehydration query: every (rule id, callsign) pair with an active record.
pub async fn get_all_active_rule_callsign_pairs(
    db: &PgPool,
) -> Result<Vec<(i64, String)>, sqlx::Error> {
    sqlx::query_as("SELECT rule_id, callsign FROM active_notifications")
        .fetch_all(db)
        .await
}

pub async fn add_tracker(
    db: &PgPool,
    kind: TrackerKind,
    guild_id: i64,
    channel_id: i64,
    message_id: i64,
    vatsim_cid: i64,
    delete_on_offline: bool,
    role_id: Option<i64>,
) -> Result<i64, sqlx::Error> {
    let sql = format!(
        r"
        INSERT INTO {} (guild_id, channel_id, message_id, vatsim_cid, delete_on_offline, role_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        ",
        kind.table()
    );
    let (id,): (i64,) = sqlx::query_as(&sql)
        .bind(guild_id)
        .bind(channel_id)
        .bind(message_id)
        .bind(vatsim_cid)
        .bind(delete_on_offline)
        .bind(role_id)
        .fetch_one(db)
        .await?;
    Ok(id)
}

pub async fn get_all_trackers(
    db: &PgPool,
    kind: TrackerKind,
) -> Result<Vec<Tracker>, sqlx::Error> {
    let sql = format!(
        r"
        SELECT id, guild_id, channel_id, message_id, vatsim_cid, delete_on_offline, role_id, ping_sent
        FROM {}
        ORDER BY id
        ",
        kind.table()
    );
    sqlx::query_as(&sql).fetch_all(db).await
}

pub async fn get_tracker_by_cid(
    db: &PgPool,
    kind: TrackerKind,
    guild_id: i64,
    vatsim_cid: i64,
) -> Result<Option<Tracker>, sqlx::Error> {
    let sql = format!(
        r"
        SELECT id, guild_id, channel_id, message_id, vatsim_cid, delete_on_offline, role_id, ping_sent
        FROM {}
        WHERE guild_id = $1 AND vatsim_cid = $2
        ",
        kind.table()
    );
    sqlx::query_as(&sql)
        .bind(guild_id)
        .bind(vatsim_cid)
        .fetch_optional(db)
        .await
}

pub async fn remove_tracker(
    db: &PgPool,
    kind: TrackerKind,
    tracker_id: i64,
) -> Result<(), sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
    sqlx::query(&sql).bind(tracker_id).execute(db).await.map(|_| ())
}

/// `None` clears the stored message id after a delete-on-offline.
pub async fn update_tracker_message(
    db: &PgPool,
    kind: TrackerKind,
    tracker_id: i64,
    message_id: Option<i64>,
) -> Result<(), sqlx::Error> {
    let sql = format!("UPDATE {} SET message_id = $1 WHERE id = $2", kind.table());
    sqlx::query(&sql)
        .bind(message_id)
        .bind(tracker_id)
        .execute(db)
        .await
        .map(|_| ())
}

pub async fn set_tracker_ping(
    db: &PgPool,
    kind: TrackerKind,
    tracker_id: i64,
    ping_sent: bool,
) -> Result<(), sqlx::Error> {
    let sql = format!("UPDATE {} SET ping_sent = $1 WHERE id = $2", kind.table());
    sqlx::query(&sql)
        .bind(ping_sent)
        .bind(tracker_id)
        .execute(db)
        .await
        .map(|_| ())
}
