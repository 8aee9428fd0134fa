use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use serenity::all::{ChannelId, GuildId, MessageId, RoleId};
use serenity::builder::{CreateEmbed, CreateMessage, EditMessage};
use serenity::model::channel::Message;
use shared::vatsim::datafeed::{Controller, DatafeedRoot, Pilot};
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::AppState;
use crate::db::{self, Tracker, TrackerKind};
use crate::embeds;
use crate::error::DeliveryError;

/// A feed entity that can be tracked by CID with a persistent message.
pub trait Trackable {
    const KIND: TrackerKind;

    fn entities(feed: &DatafeedRoot) -> &[Self]
    where
        Self: Sized;

    fn cid(&self) -> i64;

    fn render(&self) -> CreateEmbed;
}

impl Trackable for Pilot {
    const KIND: TrackerKind = TrackerKind::Flight;

    fn entities(feed: &DatafeedRoot) -> &[Self] {
        &feed.pilots
    }

    fn cid(&self) -> i64 {
        self.cid
    }

    fn render(&self) -> CreateEmbed {
        embeds::pilot_embed(self)
    }
}

impl Trackable for Controller {
    const KIND: TrackerKind = TrackerKind::Controller;

    fn entities(feed: &DatafeedRoot) -> &[Self] {
        &feed.controllers
    }

    fn cid(&self) -> i64 {
        self.cid
    }

    fn render(&self) -> CreateEmbed {
        embeds::controller_embed(self)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TrackerAction {
    /// Entity is online: refresh the message, creating it if necessary.
    Publish { ping: bool },
    /// Entity went offline and the tracker deletes its message.
    Delete,
    /// Entity went offline and the message becomes an offline notice.
    MarkOffline,
    /// Entity is offline and no message exists.
    Idle,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CyclePlan {
    pub action: TrackerAction,
    /// Re-arm the one-shot role mention for the next online transition.
    pub reset_ping: bool,
}

/// Decides what one poll observation means for a tracker. The ping fires only
/// on an offline→online transition; every offline observation re-arms it.
pub fn plan_cycle(tracker: &Tracker, online: bool) -> CyclePlan {
    if online {
        return CyclePlan {
            action: TrackerAction::Publish {
                ping: tracker.role_id.is_some() && !tracker.ping_sent,
            },
            reset_ping: false,
        };
    }

    let action = if tracker.message_id.is_none() {
        TrackerAction::Idle
    } else if tracker.delete_on_offline {
        TrackerAction::Delete
    } else {
        TrackerAction::MarkOffline
    };

    CyclePlan {
        action,
        reset_ping: tracker.ping_sent,
    }
}

pub async fn run_tracker_cycle<E>(state: &AppState, ctx: &serenity::client::Context) -> anyhow::Result<()>
where
    E: Trackable + Send + Sync,
{
    let trackers = db::get_all_trackers(&state.db, E::KIND).await?;
    if trackers.is_empty() {
        return Ok(());
    }

    let feed = state.vatsim.fetch().await?;
    let by_cid: HashMap<i64, &E> = E::entities(&feed).iter().map(|e| (e.cid(), e)).collect();

    for tracker in &trackers {
        let entity = by_cid.get(&tracker.vatsim_cid).copied();
        if let Err(err) = process_tracker::<E>(state, ctx, tracker, entity).await {
            error!(
                error = ?err,
                tracker_id = tracker.id,
                cid = tracker.vatsim_cid,
                kind = E::KIND.noun(),
                "failed to process tracker"
            );
        }

        // Small jitter between message operations to stay under rate limits.
        let jitter_ms = rand::rng().random_range(200..=1200);
        sleep(Duration::from_millis(jitter_ms)).await;
    }

    Ok(())
}

async fn process_tracker<E>(
    state: &AppState,
    ctx: &serenity::client::Context,
    tracker: &Tracker,
    entity: Option<&E>,
) -> anyhow::Result<()>
where
    E: Trackable + Send + Sync,
{
    let channel_id = ChannelId::new(tracker.channel_id as u64);

    if let Err(err) = ctx.http.get_channel(channel_id).await {
        match DeliveryError::from(err) {
            DeliveryError::NotFound | DeliveryError::Forbidden => {
                info!(
                    tracker_id = tracker.id,
                    channel_id = tracker.channel_id,
                    kind = E::KIND.noun(),
                    "tracker channel no longer resolves, removing tracker"
                );
                db::remove_tracker(&state.db, E::KIND, tracker.id).await?;
                return Ok(());
            }
            // Transient failure: leave the tracker alone until the next tick.
            DeliveryError::Other(err) => return Err(err.into()),
        }
    }

    let plan = plan_cycle(tracker, entity.is_some());

    if plan.reset_ping {
        db::set_tracker_ping(&state.db, E::KIND, tracker.id, false).await?;
    }

    if let Some(entity) = entity {
        let ping = matches!(plan.action, TrackerAction::Publish { ping: true });
        publish(state, ctx, channel_id, tracker, E::KIND, entity.render(), ping).await
    } else {
        match plan.action {
            TrackerAction::Delete => retire_message(state, ctx, channel_id, tracker, E::KIND).await,
            TrackerAction::MarkOffline => {
                mark_offline(state, ctx, channel_id, tracker, E::KIND).await
            }
            TrackerAction::Idle | TrackerAction::Publish { .. } => Ok(()),
        }
    }
}

/// Edit the tracker message in place, recreating it when it disappeared. The
/// store is only touched once the message operation's outcome is known.
async fn publish(
    state: &AppState,
    ctx: &serenity::client::Context,
    channel_id: ChannelId,
    tracker: &Tracker,
    kind: TrackerKind,
    embed: CreateEmbed,
    ping: bool,
) -> anyhow::Result<()> {
    let content = if ping { mention_for(ctx, tracker) } else { None };

    let mut new_message_id = None;
    if let Some(message_id) = tracker.message_id {
        // An empty content on later edits clears a lingering mention.
        let edit = EditMessage::new()
            .content(content.clone().unwrap_or_default())
            .embed(embed.clone());
        match channel_id
            .edit_message(&ctx.http, MessageId::new(message_id as u64), edit)
            .await
        {
            Ok(_) => {}
            Err(err) => match DeliveryError::from(err) {
                DeliveryError::NotFound => {
                    match send_message(ctx, channel_id, content.as_deref(), embed).await? {
                        Some(message) => new_message_id = Some(message.id.get() as i64),
                        None => return Ok(()),
                    }
                }
                DeliveryError::Forbidden => return Ok(()),
                DeliveryError::Other(err) => return Err(err.into()),
            },
        }
    } else {
        match send_message(ctx, channel_id, content.as_deref(), embed).await? {
            Some(message) => new_message_id = Some(message.id.get() as i64),
            None => return Ok(()),
        }
    }

    if let Some(id) = new_message_id {
        db::update_tracker_message(&state.db, kind, tracker.id, Some(id)).await?;
    }
    if ping {
        db::set_tracker_ping(&state.db, kind, tracker.id, true).await?;
    }
    Ok(())
}

/// Send a new tracker message; `None` means the channel refused us and the
/// tracker is abandoned for this cycle.
async fn send_message(
    ctx: &serenity::client::Context,
    channel_id: ChannelId,
    content: Option<&str>,
    embed: CreateEmbed,
) -> anyhow::Result<Option<Message>> {
    let mut builder = CreateMessage::new().embed(embed);
    if let Some(content) = content {
        builder = builder.content(content);
    }
    match channel_id.send_message(&ctx.http, builder).await {
        Ok(message) => Ok(Some(message)),
        Err(err) => match DeliveryError::from(err) {
            DeliveryError::Forbidden | DeliveryError::NotFound => Ok(None),
            DeliveryError::Other(err) => Err(err.into()),
        },
    }
}

async fn retire_message(
    state: &AppState,
    ctx: &serenity::client::Context,
    channel_id: ChannelId,
    tracker: &Tracker,
    kind: TrackerKind,
) -> anyhow::Result<()> {
    let Some(message_id) = tracker.message_id else {
        return Ok(());
    };

    if let Err(err) = channel_id
        .delete_message(&ctx.http, MessageId::new(message_id as u64))
        .await
    {
        match DeliveryError::from(err) {
            // Already gone is as good as deleted.
            DeliveryError::NotFound | DeliveryError::Forbidden => {}
            DeliveryError::Other(err) => return Err(err.into()),
        }
    }

    db::update_tracker_message(&state.db, kind, tracker.id, None).await?;
    Ok(())
}

async fn mark_offline(
    state: &AppState,
    ctx: &serenity::client::Context,
    channel_id: ChannelId,
    tracker: &Tracker,
    kind: TrackerKind,
) -> anyhow::Result<()> {
    let Some(message_id) = tracker.message_id else {
        return Ok(());
    };

    let edit = EditMessage::new()
        .content(String::new())
        .embed(embeds::offline_embed(kind, tracker.vatsim_cid));
    match channel_id
        .edit_message(&ctx.http, MessageId::new(message_id as u64), edit)
        .await
    {
        Ok(_) => Ok(()),
        Err(err) => match DeliveryError::from(err) {
            DeliveryError::NotFound | DeliveryError::Forbidden => {
                // The message is unreachable; clear the stale reference.
                db::update_tracker_message(&state.db, kind, tracker.id, None).await?;
                Ok(())
            }
            DeliveryError::Other(err) => Err(err.into()),
        },
    }
}

fn mention_for(ctx: &serenity::client::Context, tracker: &Tracker) -> Option<String> {
    let role_id = tracker.role_id?;
    let guild = GuildId::new(tracker.guild_id as u64);
    ctx.cache
        .guild(guild)
        .is_some_and(|g| g.roles.contains_key(&RoleId::new(role_id as u64)))
        .then(|| format!("<@&{role_id}>"))
}

/// One-shot refresh used right after a tracker is created, so the placeholder
/// message shows live data without waiting for the next tick. Ping state is
/// deliberately left untouched.
pub async fn refresh_now<E>(
    state: &AppState,
    ctx: &serenity::client::Context,
    channel_id: u64,
    message_id: u64,
    cid: i64,
) where
    E: Trackable + Send + Sync,
{
    let feed = match state.vatsim.fetch().await {
        Ok(feed) => feed,
        Err(err) => {
            debug!(error = ?err, cid, "skipping initial tracker refresh");
            return;
        }
    };

    let embed = match E::entities(&feed).iter().find(|e| e.cid() == cid) {
        Some(entity) => entity.render(),
        None => embeds::offline_embed(E::KIND, cid),
    };

    let edit = EditMessage::new().embed(embed);
    if let Err(err) = ChannelId::new(channel_id)
        .edit_message(&ctx.http, MessageId::new(message_id), edit)
        .await
    {
        debug!(error = ?err, cid, "initial tracker refresh failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(message_id: Option<i64>, role_id: Option<i64>, ping_sent: bool) -> Tracker {
        Tracker {
            id: 1,
            guild_id: 100,
            channel_id: 200,
            message_id,
            vatsim_cid: 1_000_000,
            delete_on_offline: false,
            role_id,
            ping_sent,
        }
    }

    #[test]
    fn first_online_observation_pings() {
        let plan = plan_cycle(&tracker(None, Some(5), false), true);
        assert_eq!(
            plan,
            CyclePlan {
                action: TrackerAction::Publish { ping: true },
                reset_ping: false,
            }
        );
    }

    #[test]
    fn steady_state_online_does_not_ping_again() {
        let plan = plan_cycle(&tracker(Some(42), Some(5), true), true);
        assert_eq!(
            plan,
            CyclePlan {
                action: TrackerAction::Publish { ping: false },
                reset_ping: false,
            }
        );
    }

    #[test]
    fn tracker_without_role_never_pings() {
        let plan = plan_cycle(&tracker(None, None, false), true);
        assert_eq!(plan.action, TrackerAction::Publish { ping: false });
    }

    #[test]
    fn offline_observation_rearms_the_ping() {
        let plan = plan_cycle(&tracker(Some(42), Some(5), true), false);
        assert!(plan.reset_ping);
        assert_eq!(plan.action, TrackerAction::MarkOffline);
    }

    #[test]
    fn offline_with_delete_preference_deletes_the_message() {
        let mut t = tracker(Some(42), None, false);
        t.delete_on_offline = true;
        assert_eq!(plan_cycle(&t, false).action, TrackerAction::Delete);
    }

    #[test]
    fn offline_without_message_is_idle() {
        let plan = plan_cycle(&tracker(None, Some(5), false), false);
        assert_eq!(plan.action, TrackerAction::Idle);
        assert!(!plan.reset_ping);
    }

    #[test]
    fn ping_lifecycle_across_online_offline_cycle() {
        let mut t = tracker(Some(42), Some(5), false);

        // First online observation: mention fires, flag is persisted.
        let plan = plan_cycle(&t, true);
        assert_eq!(plan.action, TrackerAction::Publish { ping: true });
        t.ping_sent = true;

        // Second consecutive online observation: plain edit, no mention.
        let plan = plan_cycle(&t, true);
        assert_eq!(plan.action, TrackerAction::Publish { ping: false });

        // Offline observation: ping re-armed.
        let plan = plan_cycle(&t, false);
        assert!(plan.reset_ping);
        t.ping_sent = false;

        // Back online: mention fires again.
        let plan = plan_cycle(&t, true);
        assert_eq!(plan.action, TrackerAction::Publish { ping: true });
    }

    #[test]
    fn restart_with_persisted_ping_does_not_reping() {
        // ping_sent survives a restart in the store; a tracker reloaded while
        // its entity is still online must not mention the role again.
        let t = tracker(Some(42), Some(5), true);
        assert_eq!(plan_cycle(&t, true).action, TrackerAction::Publish { ping: false });
    }
}
