//! Interactive page: one prompt, one typed response.
//!
//! A `Page` sends (or edits) a prompt message, attaches its reaction
//! buttons, then races two waits on the event bus: a button reaction on the
//! page message by the requester, and a text message by the requester in
//! the same channel. Whichever arrives first wins; the other wait is dropped.
//! A free-text allow-list turns invalid replies into a notice and another
//! round instead of a result. Timeout and cancel both resolve to `None`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::chat::events::EventSubscription;
use crate::chat::model::{
    ChannelId, ChatEvent, ChatMessage, Embed, Emoji, MessageId, OutgoingMessage, Permissions,
    UserId,
};
use crate::chat::{ChatPlatform, EventBus};
use crate::error::{ChatError, Error, UiError};

/// Default inactivity timeout of a page.
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(120);

pub const CANCEL_EMOJI: &str = "❌";
pub const CONFIRM_EMOJI: &str = "✅";

/// Who a page talks to, and where.
#[derive(Clone)]
pub struct PageContext {
    pub platform: Arc<dyn ChatPlatform>,
    pub bus: EventBus,
    pub channel: ChannelId,
    pub requester: UserId,
    pub prefix: String,
}

impl PageContext {
    pub async fn send(&self, message: impl Into<OutgoingMessage>) -> Result<MessageId, ChatError> {
        self.platform.send_message(self.channel, message.into()).await
    }
}

/// What the requester answered with.
#[derive(Debug, Clone, PartialEq)]
pub enum Response<T> {
    Text(String),
    Button(T),
}

impl<T> Response<T> {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Button(_) => None,
        }
    }

    pub fn button(&self) -> Option<&T> {
        match self {
            Self::Button(v) => Some(v),
            Self::Text(_) => None,
        }
    }
}

/// A resolved page: the answer plus the page message it was given on.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse<T> {
    pub response: Response<T>,
    pub ui_message: Option<MessageId>,
}

#[derive(Debug, Clone)]
enum Action<T> {
    Value(T),
    Cancel,
}

enum Matched<T> {
    Button(Emoji, Action<T>),
    Message(ChatMessage),
}

/// One prompt/response round trip.
pub struct Page<T> {
    title: Option<String>,
    body: Option<String>,
    footer: Option<String>,
    embed: Option<Embed>,
    buttons: Vec<(Emoji, T)>,
    allowable_responses: Vec<String>,
    cancel_btn: bool,
    cancel_emoji: Emoji,
    cancel_btn_loc: Option<usize>,
    edit_in_place: bool,
    remove_msgs: bool,
    timeout: Duration,

    page_message: Option<MessageId>,
    user_message: Option<MessageId>,
    sent: Vec<MessageId>,
    running: bool,
    can_remove_reactions: bool,
    last_reaction: Option<Emoji>,
}

impl<T: Clone + Send + Sync> Default for Page<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> Page<T> {
    pub fn new() -> Self {
        Self {
            title: None,
            body: None,
            footer: None,
            embed: None,
            buttons: Vec::new(),
            allowable_responses: Vec::new(),
            cancel_btn: true,
            cancel_emoji: Emoji::new(CANCEL_EMOJI),
            cancel_btn_loc: None,
            edit_in_place: false,
            remove_msgs: true,
            timeout: DEFAULT_PAGE_TIMEOUT,
            page_message: None,
            user_message: None,
            sent: Vec::new(),
            running: false,
            can_remove_reactions: false,
            last_reaction: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }

    pub fn buttons(mut self, buttons: Vec<(Emoji, T)>) -> Self {
        self.buttons = buttons;
        self
    }

    /// Restrict free-text replies (case-insensitive, trimmed).
    pub fn allow_responses<I, S>(mut self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowable_responses = responses
            .into_iter()
            .map(|r| r.as_ref().trim().to_lowercase())
            .collect();
        self
    }

    pub fn without_cancel(mut self) -> Self {
        self.cancel_btn = false;
        self
    }

    pub fn cancel_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.cancel_emoji = Emoji::new(emoji);
        self
    }

    /// Position of the cancel button among the buttons (default: last).
    pub fn cancel_at(mut self, index: usize) -> Self {
        self.cancel_btn_loc = Some(index);
        self
    }

    /// Reuse the first page message for every later `run`.
    pub fn edit_in_place(mut self) -> Self {
        self.edit_in_place = true;
        self
    }

    /// Leave sent messages in the channel after the page resolves.
    pub fn keep_messages(mut self) -> Self {
        self.remove_msgs = false;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The message currently showing the page.
    pub fn page_message(&self) -> Option<MessageId> {
        self.page_message
    }

    pub fn current_embed(&self) -> Option<&Embed> {
        self.embed.as_ref()
    }

    /// Buttons in display order, cancel included.
    fn all_buttons(&self) -> Vec<(Emoji, Action<T>)> {
        let mut all: Vec<(Emoji, Action<T>)> = self
            .buttons
            .iter()
            .map(|(e, v)| (e.clone(), Action::Value(v.clone())))
            .collect();
        if self.cancel_btn {
            let loc = self.cancel_btn_loc.unwrap_or(all.len()).min(all.len());
            all.insert(loc, (self.cancel_emoji.clone(), Action::Cancel));
        }
        all
    }

    fn text_content(&self) -> Option<String> {
        let mut out = String::new();
        if let Some(title) = &self.title {
            out.push_str(&format!("**{title}**\n"));
        }
        if let Some(body) = &self.body {
            out.push_str(&format!("{body}\n"));
        }
        if let Some(footer) = &self.footer {
            out.push_str(&format!("{footer}\n"));
        }
        (!out.is_empty()).then_some(out)
    }

    /// Check the bot may run this page in a channel with `permissions`.
    /// Returns whether it may also remove other users' reactions.
    pub fn verify_permissions(&self, permissions: Permissions) -> Result<bool, UiError> {
        if !permissions.send_messages() {
            return Err(UiError::CannotSendMessages);
        }
        if self.embed.is_some() && !permissions.embed_links() {
            return Err(UiError::CannotEmbedLinks);
        }
        if !self.all_buttons().is_empty() {
            if !permissions.add_reactions() || !permissions.read_message_history() {
                return Err(UiError::CannotAddReactions);
            }
            if !permissions.external_emojis() {
                return Err(UiError::CannotAddExternalReactions);
            }
        }
        Ok(permissions.manage_messages())
    }

    /// Send the page, or edit the existing page message in place.
    async fn send(&mut self, ctx: &PageContext) -> Result<MessageId, ChatError> {
        let message = OutgoingMessage {
            content: self.text_content(),
            embed: self.embed.clone(),
        };
        match self.page_message {
            Some(id) if self.edit_in_place => {
                ctx.platform.edit_message(ctx.channel, id, message).await?;
                Ok(id)
            }
            _ => {
                let id = ctx.platform.send_message(ctx.channel, message).await?;
                self.sent.push(id);
                self.page_message = Some(id);
                Ok(id)
            }
        }
    }

    async fn add_buttons(&self, ctx: &PageContext, message: MessageId) -> Result<(), Error> {
        for (emoji, _) in self.all_buttons() {
            match ctx.platform.add_reaction(ctx.channel, message, &emoji).await {
                Ok(()) => {}
                Err(ChatError::Forbidden { .. }) => return Err(UiError::CannotAddReactions.into()),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Show the page and wait for one response.
    ///
    /// `Ok(None)` means the requester canceled or walked away.
    pub async fn run(
        &mut self,
        ctx: &PageContext,
        new_embed: Option<Embed>,
    ) -> Result<Option<PageResponse<T>>, Error> {
        let permissions = ctx.platform.permissions_for(ctx.channel).await?;
        self.can_remove_reactions = self.verify_permissions(permissions)?;

        if let Some(embed) = new_embed {
            self.embed = Some(embed);
        }

        // Subscribe before the prompt goes out so no answer can slip past.
        let mut reactions = ctx.bus.subscribe();
        let mut messages = ctx.bus.subscribe();

        let message = self.send(ctx).await?;
        if !self.running || !self.edit_in_place {
            self.add_buttons(ctx, message).await?;
        }
        self.running = true;

        loop {
            let Some(matched) = self.next_match(ctx, message, &mut reactions, &mut messages).await
            else {
                debug!(channel_id = %ctx.channel, "Page timed out");
                if self.embed.is_none() {
                    let _ = ctx.send("Timed Out!").await;
                }
                self.clear_reactions(ctx).await;
                return Ok(None);
            };

            let response = match matched {
                Matched::Button(_, Action::Cancel) => return Ok(None),
                Matched::Button(emoji, Action::Value(value)) => {
                    self.last_reaction = Some(emoji);
                    Response::Button(value)
                }
                Matched::Message(msg) => {
                    if !self.is_allowed(&msg.content) {
                        self.reject_text(ctx, &msg.content).await;
                        continue;
                    }
                    self.user_message = Some(msg.id);
                    Response::Text(msg.content)
                }
            };

            if !self.edit_in_place && self.remove_msgs {
                self.remove(ctx).await;
            } else {
                self.reset_user_react(ctx).await;
            }

            return Ok(Some(PageResponse {
                response,
                ui_message: self.page_message,
            }));
        }
    }

    /// Race a button reaction against a text reply. `None` on timeout.
    async fn next_match(
        &self,
        ctx: &PageContext,
        message: MessageId,
        reactions: &mut EventSubscription,
        messages: &mut EventSubscription,
    ) -> Option<Matched<T>> {
        let buttons = self.all_buttons();
        let requester = ctx.requester;
        let channel = ctx.channel;

        let react_filter = |event: &ChatEvent| match event {
            ChatEvent::ReactionAdded(r) if r.user_id == requester && r.message_id == message => {
                buttons
                    .iter()
                    .find(|(e, _)| *e == r.emoji)
                    .map(|(e, a)| Matched::Button(e.clone(), a.clone()))
            }
            _ => None,
        };
        let msg_filter = |event: &ChatEvent| match event {
            ChatEvent::MessageReceived(m) if m.author.id == requester && m.channel_id == channel => {
                Some(Matched::Message(m.clone()))
            }
            _ => None,
        };

        let race = async {
            tokio::select! {
                hit = reactions.next_matching(react_filter) => hit,
                hit = messages.next_matching(msg_filter) => hit,
            }
        };
        tokio::time::timeout(self.timeout, race).await.ok().flatten()
    }

    fn is_allowed(&self, content: &str) -> bool {
        self.allowable_responses.is_empty()
            || self
                .allowable_responses
                .contains(&content.trim().to_lowercase())
    }

    async fn reject_text(&mut self, ctx: &PageContext, content: &str) {
        let notice = if content.starts_with(&ctx.prefix) {
            "It appears that you used a command while a menu system is still running. \
             Disregarding the input."
                .to_string()
        } else {
            format!("`{content}` is not a valid choice. Please try again.")
        };
        match ctx.send(notice).await {
            Ok(id) => self.sent.push(id),
            Err(e) => warn!(channel_id = %ctx.channel, error = %e, "Failed to send invalid-choice notice"),
        }
    }

    /// Post an extra message that is cleaned up together with the page.
    pub async fn send_extra(
        &mut self,
        ctx: &PageContext,
        message: impl Into<OutgoingMessage>,
    ) -> Result<MessageId, ChatError> {
        let id = ctx.send(message).await?;
        self.sent.push(id);
        Ok(id)
    }

    /// Remove the requester's last button reaction so it can be pressed again.
    async fn reset_user_react(&mut self, ctx: &PageContext) {
        let (Some(emoji), Some(message)) = (self.last_reaction.take(), self.page_message) else {
            return;
        };
        if !self.can_remove_reactions {
            return;
        }
        if let Err(e) = ctx
            .platform
            .remove_reaction(ctx.channel, message, &emoji, ctx.requester)
            .await
        {
            debug!(error = %e, "Could not reset user reaction");
        }
    }

    async fn remove_bot_react(&self, ctx: &PageContext, emoji: &Emoji) {
        let Some(message) = self.page_message else {
            return;
        };
        let bot = ctx.platform.bot_user_id();
        if let Err(e) = ctx
            .platform
            .remove_reaction(ctx.channel, message, emoji, bot)
            .await
        {
            debug!(error = %e, "Could not remove bot reaction");
        }
    }

    async fn clear_reactions(&self, ctx: &PageContext) {
        let Some(message) = self.page_message else {
            return;
        };
        if let Err(e) = ctx.platform.clear_reactions(ctx.channel, message).await {
            debug!(error = %e, "Could not clear page reactions");
            for (emoji, _) in self.all_buttons() {
                self.remove_bot_react(ctx, &emoji).await;
            }
        }
    }

    /// Delete the requester's reply and every message the page sent.
    pub async fn remove(&mut self, ctx: &PageContext) {
        if !self.remove_msgs {
            return;
        }
        if let Some(id) = self.user_message.take() {
            let _ = ctx.platform.delete_message(ctx.channel, id).await;
        }
        for id in self.sent.drain(..) {
            let _ = ctx.platform.delete_message(ctx.channel, id).await;
        }
        if !self.edit_in_place {
            self.page_message = None;
        }
    }

    /// Swap the button set on a running page.
    pub async fn update_buttons(
        &mut self,
        ctx: &PageContext,
        new_buttons: Vec<(Emoji, T)>,
    ) -> Result<(), Error> {
        let old: Vec<Emoji> = self.all_buttons().into_iter().map(|(e, _)| e).collect();
        self.buttons = new_buttons;
        let new: Vec<Emoji> = self.all_buttons().into_iter().map(|(e, _)| e).collect();

        if !self.edit_in_place {
            return Ok(());
        }
        let Some(message) = self.page_message else {
            return Ok(());
        };

        let cleared = ctx.platform.clear_reactions(ctx.channel, message).await.is_ok();
        if !cleared {
            for emoji in old.iter().filter(|e| !new.contains(e)) {
                self.remove_bot_react(ctx, emoji).await;
            }
        }
        for emoji in &new {
            if !cleared && old.contains(emoji) {
                continue;
            }
            match ctx.platform.add_reaction(ctx.channel, message, emoji).await {
                Ok(()) => {}
                Err(ChatError::Forbidden { .. }) => return Err(UiError::CannotAddReactions.into()),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Strip the page's buttons, optionally showing a final embed.
    pub async fn finish(&mut self, ctx: &PageContext, last_embed: Option<Embed>) {
        if let Some(embed) = last_embed {
            self.embed = Some(embed);
            if let Err(e) = self.send(ctx).await {
                warn!(channel_id = %ctx.channel, error = %e, "Failed to show final page");
            }
        }
        if !(self.edit_in_place || !self.remove_msgs) {
            return;
        }
        if self.can_remove_reactions {
            self.clear_reactions(ctx).await;
        } else {
            for (emoji, _) in self.all_buttons() {
                self.remove_bot_react(ctx, &emoji).await;
            }
        }
    }
}

impl Page<bool> {
    /// A yes/no page: ✅ answers `true`, ❌ answers `false`.
    pub fn confirmation(title: impl Into<String>, body: impl Into<String>) -> Self {
        Page::new()
            .title(title)
            .body(body)
            .buttons(vec![
                (Emoji::new(CONFIRM_EMOJI), true),
                (Emoji::new(CANCEL_EMOJI), false),
            ])
            .without_cancel()
            .keep_messages()
    }
}

/// Ask a yes/no question. `None` on timeout.
pub async fn confirm(
    ctx: &PageContext,
    title: &str,
    body: &str,
    timeout: Duration,
) -> Result<Option<bool>, Error> {
    let mut page = Page::confirmation(title, body).timeout(timeout);
    let answer = page.run(ctx, None).await?;
    page.clear_reactions(ctx).await;
    Ok(answer.and_then(|r| match r.response {
        Response::Button(b) => Some(b),
        Response::Text(t) => match t.trim().to_lowercase().as_str() {
            "yes" | "y" => Some(true),
            "no" | "n" => Some(false),
            _ => None,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MemoryPlatform;
    use crate::chat::model::{Author, GuildId, ReactionEvent};
    use chrono::Utc;

    const BOT: UserId = UserId(1);
    const USER: UserId = UserId(50);
    const CHANNEL: ChannelId = ChannelId(100);

    fn setup() -> (Arc<MemoryPlatform>, PageContext) {
        let platform = Arc::new(MemoryPlatform::new(BOT));
        platform.add_channel(GuildId(9), CHANNEL, "menu");
        let ctx = PageContext {
            platform: platform.clone(),
            bus: EventBus::new(),
            channel: CHANNEL,
            requester: USER,
            prefix: ";".into(),
        };
        (platform, ctx)
    }

    fn text_from(user: UserId, content: &str) -> ChatEvent {
        ChatEvent::MessageReceived(ChatMessage {
            id: MessageId(rand_id(content)),
            channel_id: CHANNEL,
            guild_id: Some(GuildId(9)),
            author: Author {
                id: user,
                display_name: "someone".into(),
                avatar_url: None,
                bot: false,
            },
            content: content.into(),
            embeds: vec![],
            role_mentions: vec![],
            created_at: Utc::now(),
        })
    }

    fn rand_id(seed: &str) -> u64 {
        seed.bytes().fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
    }

    fn react(user: UserId, message: MessageId, emoji: &str) -> ChatEvent {
        ChatEvent::ReactionAdded(ReactionEvent {
            user_id: user,
            channel_id: CHANNEL,
            message_id: message,
            guild_id: Some(GuildId(9)),
            emoji: Emoji::new(emoji),
        })
    }

    /// Wait until the page is subscribed and its message is out.
    async fn page_message(platform: &MemoryPlatform, bus: &EventBus) -> MessageId {
        loop {
            if bus.waiter_count() >= 2
                && let Some(msg) = platform.last_message(CHANNEL)
            {
                return msg.id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn permission_checks_in_order() {
        let page: Page<u8> = Page::new().embed(Embed::default());
        let all = Permissions::all();
        assert!(matches!(
            page.verify_permissions(all.without(Permissions::SEND_MESSAGES)),
            Err(UiError::CannotSendMessages)
        ));
        assert!(matches!(
            page.verify_permissions(all.without(Permissions::EMBED_LINKS)),
            Err(UiError::CannotEmbedLinks)
        ));
        assert!(matches!(
            page.verify_permissions(all.without(Permissions::READ_MESSAGE_HISTORY)),
            Err(UiError::CannotAddReactions)
        ));
        assert!(matches!(
            page.verify_permissions(all.without(Permissions::USE_EXTERNAL_EMOJIS)),
            Err(UiError::CannotAddExternalReactions)
        ));
        assert_eq!(
            page.verify_permissions(all.without(Permissions::MANAGE_MESSAGES))
                .unwrap(),
            false
        );
    }

    #[test]
    fn cancel_button_position() {
        let page: Page<u8> = Page::new()
            .buttons(vec![(Emoji::new("1️⃣"), 1), (Emoji::new("2️⃣"), 2)])
            .cancel_at(0);
        let order: Vec<String> = page
            .all_buttons()
            .into_iter()
            .map(|(e, _)| e.0)
            .collect();
        assert_eq!(order, vec!["❌", "1️⃣", "2️⃣"]);
    }

    #[tokio::test]
    async fn button_press_resolves_and_buttons_are_attached() {
        let (platform, ctx) = setup();
        let bus = ctx.bus.clone();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let mut page = Page::new()
                    .body("Pick one")
                    .buttons(vec![(Emoji::new("👍"), "up"), (Emoji::new("👎"), "down")])
                    .keep_messages();
                page.run(&ctx, None).await
            })
        };

        let msg = page_message(&platform, &bus).await;
        // Reactions from someone else, or on other messages, are ignored.
        bus.publish(react(UserId(99), msg, "👍"));
        bus.publish(react(USER, MessageId(1), "👍"));
        bus.publish(react(USER, msg, "👎"));

        let resolved = task.await.unwrap().unwrap().unwrap();
        assert_eq!(resolved.response, Response::Button("down"));
        assert_eq!(resolved.ui_message, Some(msg));

        let attached: Vec<String> = platform
            .reactions(msg)
            .into_iter()
            .map(|(e, _)| e.0)
            .collect();
        assert_eq!(attached, vec!["👍", "👎", "❌"]);
    }

    #[tokio::test]
    async fn cancel_resolves_to_none() {
        let (platform, ctx) = setup();
        let bus = ctx.bus.clone();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let mut page: Page<u8> = Page::new().body("x").buttons(vec![(Emoji::new("1️⃣"), 1)]);
                page.run(&ctx, None).await
            })
        };
        let msg = page_message(&platform, &bus).await;
        bus.publish(react(USER, msg, CANCEL_EMOJI));
        assert!(task.await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_text_reprompts_until_allowed() {
        let (platform, ctx) = setup();
        let bus = ctx.bus.clone();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let mut page: Page<()> = Page::new()
                    .body("Type red or blue")
                    .allow_responses(["Red", "Blue"])
                    .without_cancel()
                    .keep_messages();
                page.run(&ctx, None).await
            })
        };

        page_message(&platform, &bus).await;
        bus.publish(text_from(USER, "green"));
        bus.publish(text_from(USER, ";help"));
        bus.publish(text_from(UserId(99), "red"));
        bus.publish(text_from(USER, "  BLUE "));

        let resolved = task.await.unwrap().unwrap().unwrap();
        assert_eq!(resolved.response, Response::Text("  BLUE ".into()));

        let texts = platform.bot_texts(CHANNEL);
        assert!(texts.contains(&"`green` is not a valid choice. Please try again.".to_string()));
        assert!(texts.iter().any(|t| t.starts_with("It appears that you used a command")));
    }

    #[tokio::test]
    async fn timeout_resolves_to_none_with_notice() {
        let (platform, ctx) = setup();
        let mut page: Page<()> = Page::new()
            .body("Anyone?")
            .without_cancel()
            .timeout(Duration::from_millis(30));
        let result = page.run(&ctx, None).await.unwrap();
        assert!(result.is_none());
        assert_eq!(platform.bot_texts(CHANNEL).last().unwrap(), "Timed Out!");
    }

    #[tokio::test]
    async fn missing_permission_fails_before_sending() {
        let (platform, ctx) = setup();
        platform.set_permissions(CHANNEL, Permissions::all().without(Permissions::ADD_REACTIONS));
        let mut page = Page::new().buttons(vec![(Emoji::new("1️⃣"), 1u8)]);
        let err = page.run(&ctx, None).await.unwrap_err();
        assert!(matches!(err, Error::Ui(UiError::CannotAddReactions)));
        assert!(platform.messages(CHANNEL).is_empty());
    }

    #[tokio::test]
    async fn resolved_page_cleans_up_its_messages() {
        let (platform, ctx) = setup();
        let bus = ctx.bus.clone();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let mut page: Page<()> = Page::new().body("Say anything").without_cancel();
                page.run(&ctx, None).await
            })
        };
        page_message(&platform, &bus).await;
        bus.publish(text_from(USER, "hi"));
        task.await.unwrap().unwrap().unwrap();
        assert!(platform.bot_texts(CHANNEL).is_empty());
    }

    #[tokio::test]
    async fn confirm_answers_yes() {
        let (platform, ctx) = setup();
        let bus = ctx.bus.clone();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                confirm(&ctx, "Sure?", "Really?", Duration::from_secs(2)).await
            })
        };
        let msg = page_message(&platform, &bus).await;
        bus.publish(react(USER, msg, CONFIRM_EMOJI));
        assert_eq!(task.await.unwrap().unwrap(), Some(true));
        assert!(platform.reactions(msg).is_empty());
    }
}
