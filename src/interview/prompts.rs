//! Channel texts and embeds posted by the interview flow.

use chrono::{DateTime, Utc};

use crate::chat::model::{
    ChannelId, DARK_GOLD, DARK_RED, Embed, GREET_GREEN, Member, PN_ORANGE, RoleId, UserId,
    ZERO_WIDTH_SPACE,
};

use super::state::Notice;

pub const FINAL_INTERVIEW_MESSAGE: &str = "Thank you!!! Be sure to read the rules extremely \
     carefully. You will be assisted by a staff member as soon as you have done so.";

pub const FINAL_ARCHIVE_NOTICE: &str = "**Archiving Channel!**";

pub const ARCHIVE_QUEUED_NOTICE: &str =
    "** Archiving of other channel in progress. This channel has been queued to be archived.**";

pub const ARCHIVE_ERROR_NOTICE: &str = "⚠ ERROR! Could not archive channel. Please archive, then \
     delete this channel manually. Additionally, please report this error to the bot owner.";

/// Posted in the archive channel between two archived interviews.
pub const ARCHIVE_SEPARATOR: &str = "```     ```";

/// Stands in for messages whose only content was an embed or attachment.
pub const EMBED_ONLY_PLACEHOLDER: &str = "*Embed Only Message*";

pub fn countdown_notice(minutes: u64) -> String {
    format!("**Archiving Channel in {minutes} minutes!**")
}

/// Whether a relayed message is one of the bot's own archival notices.
pub fn is_archive_notice(content: &str) -> bool {
    let content = content.trim();
    content == FINAL_ARCHIVE_NOTICE
        || content == ARCHIVE_QUEUED_NOTICE
        || (content.starts_with("**Archiving Channel in ") && content.ends_with(" minutes!**"))
}

/// Values the fixed notices interpolate.
#[derive(Debug, Clone)]
pub struct NoticeContext<'a> {
    pub prefix: &'a str,
    pub guild_name: &'a str,
    pub member_display_name: &'a str,
    pub welcome_channel: ChannelId,
    pub team_role: RoleId,
    /// Resolved team role name, if the role still exists.
    pub team_role_name: Option<&'a str>,
}

pub fn notice_text(notice: Notice, ctx: &NoticeContext<'_>) -> String {
    match notice {
        Notice::Paused => format!(
            "The interview has been paused. You may resume the interview with `{}resume`",
            ctx.prefix
        ),
        Notice::Resumed => "The interview has been resumed.".to_string(),
        Notice::ResumeNudge => format!(
            "Apologies for the interruption, Please type **{}resume** to continue your interview.",
            ctx.prefix
        ),
        Notice::TypeReset => {
            // Named, not pinged: nobody should be paged for a reset.
            let team = ctx
                .team_role_name
                .map(|name| format!("@\u{200b}{name}"))
                .unwrap_or_else(|| "Staff".to_string());
            format!(
                "{ZERO_WIDTH_SPACE} \nInterview Type has been reset. Please chose another interview \
                 type by clicking on another reaction above or ping {team} for assistance.\n{ZERO_WIDTH_SPACE}"
            )
        }
        Notice::ExistingMember => format!(
            "Please have your account that is already present on {} vouch that this new account \
             belongs to them in <#{}> and then ping staff.",
            ctx.guild_name, ctx.welcome_channel
        ),
        Notice::Other => format!(
            "{} would you please tell us how we may help you and a <@&{}> member will be with you \
             as soon as possible. Thank you!",
            ctx.member_display_name, ctx.team_role
        ),
        Notice::Finished => FINAL_INTERVIEW_MESSAGE.to_string(),
    }
}

/// The type-selection prompt. Track emojis are added as reactions after it
/// is sent.
pub fn type_prompt(guild_name: &str) -> Embed {
    let description = format!(
        "{ZERO_WIDTH_SPACE}\nIf you are **new to {guild_name}** or have been **gone for more than 30 days** \
         please click on the reaction that applies to you:\n\n\
         *Plural System:* 👥\n\
         *Questioning whether or not you are a system:* ❓\n\
         *Singlet (A person who is not plural):* 👤\n\
         *Looking to make a tulpa:* <:tupla:652995996468379677>\n\n\
         If you already have an account on {guild_name}, please click <:altAccount:652989510996721675>.\n\n\
         If you need to speak to {guild_name} staff, if you would prefer to take your interview over DM, \
         or for anything else, please click ℹ️\n"
    );
    Embed {
        description: Some(description),
        color: Some(PN_ORANGE),
        ..Default::default()
    }
}

/// Header posted to the archive channel before the relayed history.
pub fn archive_header(
    display_name: &str,
    user_id: UserId,
    avatar_url: Option<&str>,
    started_at: DateTime<Utc>,
) -> Embed {
    let mut embed = Embed::default()
        .with_color(DARK_GOLD)
        .with_timestamp(started_at)
        .with_author(format!("Interview with {display_name}"))
        .with_footer(format!("User ID: {user_id}"));
    if let Some(url) = avatar_url {
        embed = embed.with_thumbnail(url);
    }
    embed
}

/// Timestamp-only embed attached to a relayed message to mark elapsed time.
pub fn time_marker(at: DateTime<Utc>) -> Embed {
    Embed::default()
        .with_color(crate::chat::model::LIGHT_GREY)
        .with_timestamp(at)
        .with_footer(ZERO_WIDTH_SPACE)
}

fn log_embed(
    description: String,
    author: String,
    color: u32,
    member: &Member,
    staff: &Member,
    linked: Option<&Member>,
) -> Embed {
    let mut embed = Embed {
        description: Some(description),
        ..Default::default()
    }
    .with_color(color)
    .with_timestamp(Utc::now())
    .with_author(author)
    .with_footer(format!("Greeter {}'s ID: {}", staff.name, staff.id));
    if let Some(url) = &member.avatar_url {
        embed = embed.with_thumbnail(url.clone());
    }
    if let Some(linked) = linked {
        embed.add_field(
            "Linked Account:",
            format!(
                "This Member is related to: <@{}>\n{}'s ID: `{}`",
                linked.id, linked.name, linked.id
            ),
            false,
        );
    }
    embed
}

/// Log entry for an approved member.
pub fn log_greet(
    member_role: RoleId,
    member: &Member,
    greeter: &Member,
    linked: Option<&Member>,
) -> Embed {
    log_embed(
        format!(
            "<@{}> was given the <@&{member_role}> role by <@{}>\n {ZERO_WIDTH_SPACE} \n{}'s ID: `{}`",
            member.id, greeter.id, member.name, member.id
        ),
        format!("{} greeted {}", greeter.name, member.name),
        GREET_GREEN,
        member,
        greeter,
        linked,
    )
}

/// Log entry for a rejected member.
pub fn log_deny(member: &Member, staff: &Member, linked: Option<&Member>) -> Embed {
    log_embed(
        format!(
            "<@{}> was denied membership by <@{}>\n {ZERO_WIDTH_SPACE} \n{}'s ID: `{}`",
            member.id, staff.id, member.name, member.id
        ),
        format!("{} denied membership for {}", staff.name, member.name),
        DARK_RED,
        member,
        staff,
        linked,
    )
}
