use serenity::all::Colour;
use serenity::builder::{CreateEmbed, CreateEmbedFooter};
use serenity::model::Timestamp;
use shared::vatsim::datafeed::{Atis, Controller, Pilot};

use crate::db::TrackerKind;
use crate::matching::{AtisReport, identifier_variants};

const MAX_ATIS_CHARS: usize = 1000;
const FOOTER: &str = "VATSIM ATC Notifier";

/// Body of a combined airport notification, one line per controller. Callers
/// pass the controllers pre-sorted by callsign.
pub fn airport_description(controllers: &[&Controller]) -> String {
    let mut description = String::new();
    for controller in controllers {
        description.push_str(&format!(
            "**`{}`** ({}) - {}\n",
            controller.callsign, controller.frequency, controller.name
        ));
    }
    description
}

/// Field label for one ATIS station, e.g. "ATIS (Departure)" for KSEA_D_ATIS.
pub fn atis_label(callsign: &str, identifier: &str) -> String {
    let mut code = callsign;
    for variant in identifier_variants(identifier) {
        if let Some(rest) = code.strip_prefix(&format!("{variant}_")) {
            code = rest;
            break;
        }
    }
    code = code.strip_suffix("_ATIS").unwrap_or(code);
    match code {
        "" | "ATIS" => "ATIS".to_string(),
        "D" => "ATIS (Departure)".to_string(),
        "A" => "ATIS (Arrival)".to_string(),
        other => format!("ATIS ({other})"),
    }
}

pub fn atis_text(lines: &[String]) -> String {
    let text = lines.join("\n");
    if text.len() > MAX_ATIS_CHARS {
        let mut cut = MAX_ATIS_CHARS;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &text[..cut])
    } else {
        text
    }
}

pub fn airport_embed(
    identifier: &str,
    controllers: &[&Controller],
    report: &AtisReport<'_>,
) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(format!("📡 ATC Online at {identifier}"))
        .description(airport_description(controllers))
        .colour(Colour::BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(FOOTER));

    match report {
        AtisReport::Active(stations) => {
            for atis in stations {
                embed = embed.field(
                    atis_label(&atis.callsign, identifier),
                    atis_field_value(atis),
                    false,
                );
            }
        }
        AtisReport::NonTerminalOnly => {
            embed = embed.field(
                "ATIS",
                "Approach/Center positions do not have a dedicated ATIS.",
                false,
            );
        }
        AtisReport::NotFound => {
            embed = embed.field("ATIS", "No active ATIS found.", false);
        }
    }

    embed
}

fn atis_field_value(atis: &Atis) -> String {
    match atis.text_atis.as_deref() {
        Some(lines) if !lines.is_empty() => format!("```\n{}\n```", atis_text(lines)),
        _ => "ATIS information not available.".to_string(),
    }
}

pub fn controller_embed(controller: &Controller) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(format!("📡 Controller Online: {}", controller.callsign))
        .description(format!("**{}** (`{}`)", controller.name, controller.cid))
        .colour(Colour::BLUE)
        .timestamp(Timestamp::now())
        .field("Frequency", format!("`{}`", controller.frequency), true)
        .field(
            "Online Since",
            format!("<t:{}:R>", controller.logon_time.timestamp()),
            true,
        )
        .footer(CreateEmbedFooter::new("Last Updated"));

    if let Some(lines) = controller.text_atis.as_deref()
        && !lines.is_empty()
    {
        embed = embed.field(
            "Controller Message",
            format!("```\n{}\n```", atis_text(lines)),
            false,
        );
    }

    embed
}

pub fn pilot_embed(pilot: &Pilot) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(format!("✈️ Live Flight: {}", pilot.callsign))
        .description(format!("**{}** (`{}`)", pilot.name, pilot.cid))
        .colour(Colour::DARK_GREEN)
        .timestamp(Timestamp::now());

    if let Some(plan) = &pilot.flight_plan {
        embed = embed
            .field("Departure", format!("`{}`", plan.departure), true)
            .field("Arrival", format!("`{}`", plan.arrival), true)
            .field("Aircraft", format!("`{}`", plan.aircraft_short), true);
        if !plan.route.is_empty() {
            embed = embed.field("Route", format!("```\n{}\n```", plan.route), false);
        }
    }

    embed
        .field("Altitude", format!("`{}` ft", pilot.altitude), true)
        .field("Speed", format!("`{}` kts", pilot.groundspeed), true)
        .field("Heading", format!("`{}°`", pilot.heading), true)
        .footer(CreateEmbedFooter::new(format!(
            "Online Since: {} UTC | Last Updated",
            pilot.logon_time.format("%Y-%m-%d %H:%M:%S")
        )))
}

pub fn offline_embed(kind: TrackerKind, cid: i64) -> CreateEmbed {
    let (title, description) = match kind {
        TrackerKind::Flight => (
            "✈️ Pilot Offline",
            format!("The pilot with CID `{cid}` is not currently connected to the VATSIM network."),
        ),
        TrackerKind::Controller => (
            "📡 Controller Offline",
            format!("The controller with CID `{cid}` is not currently connected to VATSIM."),
        ),
    };

    CreateEmbed::new()
        .title(title)
        .description(description)
        .colour(Colour::RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("Last Updated"))
}

pub fn placeholder_embed(kind: TrackerKind, cid: i64) -> CreateEmbed {
    CreateEmbed::new()
        .title(format!("Initializing {} Tracker for CID: {cid}", kind.label()))
        .description("Fetching initial data...")
        .colour(Colour::LIGHT_GREY)
}

/// Ephemeral `/lookup atis` response; callers pass a non-empty station list.
pub fn atis_lookup_embed(airport: &str, stations: &[&Atis]) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(format!("📄 ATIS for {airport}"))
        .colour(Colour::DARK_GREEN)
        .timestamp(Timestamp::now());

    for atis in stations {
        embed = embed.field(
            format!("{} - {}", atis_label(&atis.callsign, airport), atis.frequency),
            atis_field_value(atis),
            false,
        );
    }

    embed
}

pub fn permission_error_embed(guild_name: &str, channel_id: u64) -> CreateEmbed {
    CreateEmbed::new()
        .title("⚠️ Permission Error")
        .description(format!(
            "Hello! I was unable to send an ATC notification in your server **{guild_name}**."
        ))
        .colour(Colour::RED)
        .timestamp(Timestamp::now())
        .field(
            "Problem Channel",
            format!("<#{channel_id}> (`{channel_id}`)"),
            false,
        )
        .field(
            "Required Permissions",
            "• Send Messages\n• Embed Links",
            false,
        )
        .footer(CreateEmbedFooter::new(
            "Please update my role permissions in that channel.",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn controller(callsign: &str, frequency: &str, name: &str) -> Controller {
        Controller {
            cid: 1_000_000,
            name: name.to_string(),
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

    #[test]
    fn airport_description_lists_each_controller_line() {
        let twr = controller("ORD_TWR", "118.300", "Alice");
        let gnd = controller("ORD_GND", "121.750", "Bob");
        let description = airport_description(&[&gnd, &twr]);
        assert_eq!(
            description,
            "**`ORD_GND`** (121.750) - Bob\n**`ORD_TWR`** (118.300) - Alice\n"
        );
        assert!(description.contains("`ORD_TWR`"));
    }

    #[test]
    fn atis_label_maps_departure_and_arrival_codes() {
        assert_eq!(atis_label("KSEA_D_ATIS", "KSEA"), "ATIS (Departure)");
        assert_eq!(atis_label("KSEA_A_ATIS", "KSEA"), "ATIS (Arrival)");
        assert_eq!(atis_label("KSEA_ATIS", "KSEA"), "ATIS");
    }

    #[test]
    fn atis_label_strips_any_identifier_variant() {
        assert_eq!(atis_label("KSEA_ATIS", "SEA"), "ATIS");
        assert_eq!(atis_label("SEA_ATIS", "KSEA"), "ATIS");
    }

    #[test]
    fn atis_text_truncates_long_broadcasts() {
        let lines = vec!["X".repeat(600), "Y".repeat(600)];
        let text = atis_text(&lines);
        assert!(text.ends_with("..."));
        assert_eq!(text.len(), 1003);
    }

    #[test]
    fn atis_text_keeps_short_broadcasts_intact() {
        let lines = vec!["INFO A".to_string(), "RWY 28C".to_string()];
        assert_eq!(atis_text(&lines), "INFO A\nRWY 28C");
    }
}
