use std::collections::HashSet;

use serenity::all::{ActivityData, ChannelId, GuildId, MessageId, RoleId};
use serenity::builder::CreateMessage;
use shared::vatsim::datafeed::DatafeedRoot;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::cache::NotifiedCache;
use crate::db;
use crate::embeds;
use crate::error::DeliveryError;
use crate::matching::{self, RuleMatch};

/// One poll cycle for airport/position subscriptions: fetch, match against
/// all rules, deliver combined notifications, then sweep offline controllers.
pub async fn run_airport_cycle(
    state: &AppState,
    ctx: &serenity::client::Context,
    cache: &mut NotifiedCache,
) -> anyhow::Result<()> {
    let feed = state.vatsim.fetch().await?;
    let rules = db::get_all_notifications(&state.db).await?;

    update_presence(ctx, rules.len());

    let groups = matching::match_rules(&feed, &rules, cache);
    for group in &groups {
        if let Err(err) = deliver_group(state, ctx, &feed, group, cache).await {
            error!(
                error = ?err,
                rule_id = group.rule.id,
                identifier = %group.rule.airport_icao,
                "failed to deliver notification group"
            );
        }
    }

    offline_sweep(state, ctx, &feed, cache).await;
    Ok(())
}

fn update_presence(ctx: &serenity::client::Context, rule_count: usize) {
    let guild_count = ctx.cache.guilds().len();
    ctx.set_activity(Some(ActivityData::watching(format!(
        "{rule_count} notifications in {guild_count} servers"
    ))));
}

async fn deliver_group(
    state: &AppState,
    ctx: &serenity::client::Context,
    feed: &DatafeedRoot,
    group: &RuleMatch<'_>,
    cache: &mut NotifiedCache,
) -> anyhow::Result<()> {
    let rule = group.rule;
    let channel_id = ChannelId::new(rule.channel_id as u64);

    if let Err(err) = ctx.http.get_channel(channel_id).await {
        match DeliveryError::from(err) {
            DeliveryError::NotFound | DeliveryError::Forbidden => {
                warn!(
                    rule_id = rule.id,
                    channel_id = rule.channel_id,
                    "notification channel does not resolve, skipping rule"
                );
                return Ok(());
            }
            DeliveryError::Other(err) => return Err(err.into()),
        }
    }

    let report = matching::atis_report(feed, &rule.airport_icao, &group.controllers);
    let embed = embeds::airport_embed(&rule.airport_icao, &group.controllers, &report);
    let mut message = CreateMessage::new().embed(embed);
    if let Some(role_id) = rule.role_id
        && role_resolves(ctx, rule.guild_id, role_id)
    {
        message = message.content(format!("<@&{role_id}>"));
    }

    match channel_id.send_message(&ctx.http, message).await {
        Ok(sent) => {
            info!(
                rule_id = rule.id,
                identifier = %rule.airport_icao,
                controllers = group.controllers.len(),
                "sent combined ATC notification"
            );
            for controller in &group.controllers {
                cache.insert(rule.id, &controller.callsign);
            }
            if rule.delete_on_offline {
                let callsigns: Vec<&str> = group
                    .controllers
                    .iter()
                    .map(|c| c.callsign.as_str())
                    .collect();
                if let Err(err) = db::add_active_notifications(
                    &state.db,
                    rule.id,
                    sent.id.get() as i64,
                    rule.channel_id,
                    &callsigns,
                )
                .await
                {
                    error!(
                        error = ?err,
                        rule_id = rule.id,
                        "failed to persist active notification records"
                    );
                }
            }
        }
        Err(err) => match DeliveryError::from(err) {
            DeliveryError::Forbidden => notify_owner(ctx, rule).await,
            // Channel disappeared between the resolve check and the send.
            DeliveryError::NotFound => {}
            DeliveryError::Other(err) => return Err(err.into()),
        },
    }

    Ok(())
}

fn role_resolves(ctx: &serenity::client::Context, guild_id: i64, role_id: i64) -> bool {
    ctx.cache
        .guild(GuildId::new(guild_id as u64))
        .is_some_and(|g| g.roles.contains_key(&RoleId::new(role_id as u64)))
}

/// Best-effort DM to the guild owner when a channel refuses the bot. Failures
/// here are swallowed; there is nobody else left to tell.
async fn notify_owner(ctx: &serenity::client::Context, rule: &db::NotificationRule) {
    warn!(
        guild_id = rule.guild_id,
        channel_id = rule.channel_id,
        "missing permissions to send notification, notifying guild owner"
    );

    let Ok(guild) = ctx.http.get_guild(GuildId::new(rule.guild_id as u64)).await else {
        return;
    };
    let Ok(owner) = guild.owner_id.to_user(&ctx.http).await else {
        return;
    };

    let embed = embeds::permission_error_embed(&guild.name, rule.channel_id as u64);
    if let Err(err) = owner
        .direct_message(&ctx.http, CreateMessage::new().embed(embed))
        .await
    {
        debug!(
            error = ?err,
            guild_id = rule.guild_id,
            "could not DM guild owner about missing permissions"
        );
    }
}

/// Deletes messages for controllers that went offline and prunes the cache to
/// exactly the callsigns still present in this snapshot.
async fn offline_sweep(
    state: &AppState,
    ctx: &serenity::client::Context,
    feed: &DatafeedRoot,
    cache: &mut NotifiedCache,
) {
    let online: HashSet<&str> = feed
        .controllers
        .iter()
        .map(|c| c.callsign.as_str())
        .collect();

    for callsign in cache.offline_callsigns(&online) {
        match db::get_active_notification_by_callsign(&state.db, &callsign).await {
            Ok(Some(record)) => {
                let channel_id = ChannelId::new(record.channel_id as u64);
                match channel_id
                    .delete_message(&ctx.http, MessageId::new(record.message_id as u64))
                    .await
                {
                    Ok(()) => info!(
                        callsign = %callsign,
                        message_id = record.message_id,
                        "deleted notification for offline controller"
                    ),
                    Err(err) => match DeliveryError::from(err) {
                        // Already gone, or we lost access; either way proceed.
                        DeliveryError::NotFound | DeliveryError::Forbidden => {}
                        DeliveryError::Other(err) => warn!(
                            error = ?err,
                            callsign = %callsign,
                            "could not delete notification message"
                        ),
                    },
                }
                if let Err(err) =
                    db::remove_active_notification_by_callsign(&state.db, &callsign).await
                {
                    error!(
                        error = ?err,
                        callsign = %callsign,
                        "failed to remove active notification record"
                    );
                }
            }
            Ok(None) => {}
            Err(err) => error!(
                error = ?err,
                callsign = %callsign,
                "failed to look up active notification record"
            ),
        }
    }

    cache.retain_online(&online);
}
