use anyhow::anyhow;
use poise::CreateReply;
use serenity::all::{ChannelId, GuildChannel, MessageId, Role};
use serenity::builder::{CreateEmbed, CreateMessage};
use shared::vatsim::datafeed::{Controller, Pilot};
use tracing::warn;

use crate::db::{self, TrackerKind};
use crate::embeds;
use crate::error::DeliveryError;
use crate::matching;
use crate::trackers::{self, Trackable};
use crate::{Error, PoiseContext};

#[poise::command(
    slash_command,
    rename = "atcnotify",
    subcommands("add", "remove", "list"),
    guild_only
)]
pub async fn atcnotify(_ctx: PoiseContext<'_>) -> Result<(), Error> {
    Ok(())
}

#[poise::command(slash_command, required_permissions = "MANAGE_GUILD")]
async fn add(
    ctx: PoiseContext<'_>,
    #[description = "The airport ICAO or center prefix (e.g. KORD, CLE)"] identifier: String,
    #[description = "The channel to send notifications in"] channel: GuildChannel,
    #[description = "The role to ping for the notification"] role: Option<Role>,
    #[description = "Delete the notification message when the controller goes offline"]
    delete_message: Option<bool>,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| anyhow!("This command can only be used in a server"))?;

    let identifier = identifier.trim().to_ascii_uppercase();
    if !(3..=4).contains(&identifier.len()) || !identifier.chars().all(|c| c.is_ascii_alphabetic())
    {
        ctx.send(
            CreateReply::default()
                .content("The identifier must be 3 or 4 letters long.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let data = ctx.data();
    let delete_on_offline = delete_message.unwrap_or(false);
    let role_id = role.as_ref().map(|r| r.id.get() as i64);

    if db::notification_exists(
        &data.db,
        guild_id.get() as i64,
        &identifier,
        channel.id.get() as i64,
        role_id,
    )
    .await?
    {
        ctx.send(
            CreateReply::default()
                .content(format!(
                    "A notification for **{identifier}** in <#{}> already exists.",
                    channel.id
                ))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    db::add_notification(
        &data.db,
        guild_id.get() as i64,
        &identifier,
        channel.id.get() as i64,
        role_id,
        delete_on_offline,
    )
    .await?;

    let ping_text = role
        .as_ref()
        .map(|r| format!("and ping <@&{}> ", r.id))
        .unwrap_or_default();
    let mut response = format!(
        "✅ Success! I will now notify in <#{}> {ping_text}when ATC for **{identifier}** comes online.",
        channel.id
    );
    if delete_on_offline {
        response.push_str(
            "\n*The notification message will be deleted when the controller goes offline.*",
        );
    }
    ctx.say(response).await?;
    Ok(())
}

#[poise::command(slash_command, required_permissions = "MANAGE_GUILD")]
async fn remove(
    ctx: PoiseContext<'_>,
    #[description = "The notification id, as shown by /atcnotify list"] id: i64,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| anyhow!("This command can only be used in a server"))?;

    let removed = db::remove_notification(&ctx.data().db, id, guild_id.get() as i64).await?;
    let content = if removed > 0 {
        "✅ Notification has been removed.".to_string()
    } else {
        format!("No notification with id `{id}` exists in this server.")
    };
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

#[poise::command(slash_command)]
async fn list(ctx: PoiseContext<'_>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| anyhow!("This command can only be used in a server"))?;

    let rules = db::get_notifications_by_guild(&ctx.data().db, guild_id.get() as i64).await?;
    if rules.is_empty() {
        ctx.send(
            CreateReply::default()
                .content("There are no active notifications for this server.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let mut description = String::new();
    for rule in &rules {
        let ping_text = match rule.role_id {
            Some(role_id) => format!("pings <@&{role_id}>"),
            None => "pings no role".to_string(),
        };
        description.push_str(&format!(
            "• `{}` **{}** -> <#{}> ({ping_text})\n",
            rule.id, rule.airport_icao, rule.channel_id
        ));
    }

    let embed = CreateEmbed::new()
        .title("Active Notifications")
        .description(description);
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

#[poise::command(
    slash_command,
    rename = "track-pilot",
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn track_pilot(
    ctx: PoiseContext<'_>,
    #[description = "The VATSIM CID of the pilot to track"] cid: i64,
    #[description = "The channel to post the tracking embed in"] channel: GuildChannel,
    #[description = "The role to ping when the pilot comes online"] role: Option<Role>,
    #[description = "Delete the message when the pilot logs off"] delete_on_offline: Option<bool>,
) -> Result<(), Error> {
    track_entity::<Pilot>(ctx, cid, channel, role, delete_on_offline.unwrap_or(false)).await
}

#[poise::command(
    slash_command,
    rename = "untrack-pilot",
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn untrack_pilot(
    ctx: PoiseContext<'_>,
    #[description = "The VATSIM CID of the pilot to untrack"] cid: i64,
) -> Result<(), Error> {
    untrack_entity::<Pilot>(ctx, cid).await
}

#[poise::command(
    slash_command,
    rename = "track-controller",
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn track_controller(
    ctx: PoiseContext<'_>,
    #[description = "The VATSIM CID of the controller to track"] cid: i64,
    #[description = "The channel to post the tracking embed in"] channel: GuildChannel,
    #[description = "The role to ping when the controller comes online"] role: Option<Role>,
    #[description = "Delete the message when the controller logs off"] delete_on_offline: Option<
        bool,
    >,
) -> Result<(), Error> {
    track_entity::<Controller>(ctx, cid, channel, role, delete_on_offline.unwrap_or(false)).await
}

#[poise::command(
    slash_command,
    rename = "untrack-controller",
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn untrack_controller(
    ctx: PoiseContext<'_>,
    #[description = "The VATSIM CID of the controller to untrack"] cid: i64,
) -> Result<(), Error> {
    untrack_entity::<Controller>(ctx, cid).await
}

async fn track_entity<E>(
    ctx: PoiseContext<'_>,
    cid: i64,
    channel: GuildChannel,
    role: Option<Role>,
    delete_on_offline: bool,
) -> Result<(), Error>
where
    E: Trackable + Send + Sync,
{
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| anyhow!("This command can only be used in a server"))?;
    ctx.defer_ephemeral().await?;

    let data = ctx.data();
    if db::get_tracker_by_cid(&data.db, E::KIND, guild_id.get() as i64, cid)
        .await?
        .is_some()
    {
        ctx.say(format!(
            "A {} tracker for CID `{cid}` already exists in this server.",
            E::KIND.noun()
        ))
        .await?;
        return Ok(());
    }

    let placeholder = CreateMessage::new().embed(embeds::placeholder_embed(E::KIND, cid));
    let message = match channel
        .id
        .send_message(ctx.serenity_context(), placeholder)
        .await
    {
        Ok(message) => message,
        Err(err) => match DeliveryError::from(err) {
            DeliveryError::Forbidden => {
                ctx.say("I don't have permission to send messages in that channel.")
                    .await?;
                return Ok(());
            }
            DeliveryError::NotFound => {
                ctx.say("That channel no longer exists.").await?;
                return Ok(());
            }
            DeliveryError::Other(err) => return Err(err.into()),
        },
    };

    let role_id = role.as_ref().map(|r| r.id.get() as i64);
    db::add_tracker(
        &data.db,
        E::KIND,
        guild_id.get() as i64,
        channel.id.get() as i64,
        message.id.get() as i64,
        cid,
        delete_on_offline,
        role_id,
    )
    .await?;

    let mut response = format!(
        "✅ {} tracker for CID `{cid}` created in <#{}>.",
        E::KIND.label(),
        channel.id
    );
    if let Some(role) = &role {
        response.push_str(&format!(
            "\n*I will ping <@&{}> when the {} comes online.*",
            role.id,
            E::KIND.noun()
        ));
    }
    if delete_on_offline {
        response.push_str(&format!(
            "\n*This message will be deleted when the {} goes offline.*",
            E::KIND.noun()
        ));
    }
    ctx.say(response).await?;

    // Fill the placeholder with live data right away, without consuming the
    // first-ping opportunity.
    trackers::refresh_now::<E>(
        data,
        ctx.serenity_context(),
        channel.id.get(),
        message.id.get(),
        cid,
    )
    .await;
    Ok(())
}

async fn untrack_entity<E>(ctx: PoiseContext<'_>, cid: i64) -> Result<(), Error>
where
    E: Trackable + Send + Sync,
{
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| anyhow!("This command can only be used in a server"))?;
    ctx.defer_ephemeral().await?;

    let data = ctx.data();
    let Some(tracker) =
        db::get_tracker_by_cid(&data.db, E::KIND, guild_id.get() as i64, cid).await?
    else {
        ctx.say(format!(
            "No {} tracker found for CID `{cid}` in this server.",
            E::KIND.noun()
        ))
        .await?;
        return Ok(());
    };

    if let Some(message_id) = tracker.message_id {
        let _ = ChannelId::new(tracker.channel_id as u64)
            .delete_message(
                ctx.serenity_context(),
                MessageId::new(message_id as u64),
            )
            .await;
    }

    db::remove_tracker(&data.db, E::KIND, tracker.id).await?;
    ctx.say(format!(
        "✅ The {} tracker for CID `{cid}` has been removed.",
        E::KIND.noun()
    ))
    .await?;
    Ok(())
}

#[poise::command(slash_command, rename = "lookup", subcommands("atc", "atis", "pilot"))]
pub async fn lookup(_ctx: PoiseContext<'_>) -> Result<(), Error> {
    Ok(())
}

#[poise::command(slash_command)]
async fn atc(
    ctx: PoiseContext<'_>,
    #[description = "The full callsign of the controller (e.g. PHL_TWR)"] callsign: String,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let Some(feed) = fetch_or_apologize(&ctx).await? else {
        return Ok(());
    };

    match feed
        .controllers
        .iter()
        .find(|c| c.callsign.eq_ignore_ascii_case(&callsign))
    {
        Some(controller) => {
            ctx.send(CreateReply::default().embed(embeds::controller_embed(controller)))
                .await?;
        }
        None => {
            ctx.say(format!(
                "No controller found with the callsign `{}`.",
                callsign.to_ascii_uppercase()
            ))
            .await?;
        }
    }
    Ok(())
}

#[poise::command(slash_command)]
async fn pilot(
    ctx: PoiseContext<'_>,
    #[description = "The VATSIM CID of the pilot to look up"] cid: i64,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let Some(feed) = fetch_or_apologize(&ctx).await? else {
        return Ok(());
    };

    match feed.pilots.iter().find(|p| p.cid == cid) {
        Some(pilot) => {
            ctx.send(CreateReply::default().embed(embeds::pilot_embed(pilot)))
                .await?;
        }
        None => {
            ctx.say(format!("No online pilot found with CID `{cid}`."))
                .await?;
        }
    }
    Ok(())
}

#[poise::command(slash_command)]
async fn atis(
    ctx: PoiseContext<'_>,
    #[description = "The ICAO code of the airport (e.g. KPHL)"] airport: String,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let Some(feed) = fetch_or_apologize(&ctx).await? else {
        return Ok(());
    };

    let airport = airport.trim().to_ascii_uppercase();
    let stations = matching::matching_atis(&feed, &airport);
    if stations.is_empty() {
        ctx.say(format!("No active ATIS found for `{airport}`."))
            .await?;
        return Ok(());
    }

    ctx.send(CreateReply::default().embed(embeds::atis_lookup_embed(&airport, &stations)))
        .await?;
    Ok(())
}

async fn fetch_or_apologize(
    ctx: &PoiseContext<'_>,
) -> Result<Option<shared::vatsim::datafeed::DatafeedRoot>, Error> {
    match ctx.data().vatsim.fetch().await {
        Ok(feed) => Ok(Some(feed)),
        Err(err) => {
            warn!(error = ?err, "lookup command could not fetch datafeed");
            ctx.say("Could not retrieve data from VATSIM.").await?;
            Ok(None)
        }
    }
}
