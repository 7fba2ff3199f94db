//! Multi-step reaction menus built from one edit-in-place `Page`.
//!
//! Every step re-renders the same message with a new embed and button set.
//! A `None` from any step means the user canceled or timed out; callers
//! abort the flow and call `ReactionMenu::cancel`.

use tracing::debug;

use crate::chat::model::{Embed, Emoji, LIGHT_GREY, ZERO_WIDTH_SPACE};
use crate::error::Error;

use super::page::{CONFIRM_EMOJI, Page, PageContext, Response};

/// Keycap emojis; index `n` is the keycap for `n`.
pub const NUMBER_EMOJIS: [&str; 10] = [
    "0️⃣", "1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣", "6️⃣", "7️⃣", "8️⃣", "9️⃣",
];

/// Items shown per sub-page (one keycap each).
pub const MAX_PER_PAGE: usize = 9;

pub const LEFT_EMOJI: &str = "⬅";
pub const RIGHT_EMOJI: &str = "➡";
pub const CATEGORY_EMOJI: &str = "📊";
pub const STOP_EMOJI: &str = "🛑";

/// Buttons a menu page can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuButton {
    Left,
    Right,
    Categories,
    /// Zero-based position in the currently shown list.
    Pick(usize),
}

fn number_buttons(count: usize) -> Vec<(Emoji, MenuButton)> {
    (0..count.min(MAX_PER_PAGE))
        .map(|i| (Emoji::new(NUMBER_EMOJIS[i + 1]), MenuButton::Pick(i)))
        .collect()
}

fn nav_buttons() -> Vec<(Emoji, MenuButton)> {
    vec![
        (Emoji::new(LEFT_EMOJI), MenuButton::Left),
        (Emoji::new(RIGHT_EMOJI), MenuButton::Right),
        (Emoji::new(CATEGORY_EMOJI), MenuButton::Categories),
    ]
}

/// Page / sub-page position over a list of categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    sizes: Vec<usize>,
    per_page: usize,
    pub page: usize,
    pub sub_page: usize,
    pub showing_categories: bool,
}

impl PageCursor {
    pub fn new(sizes: Vec<usize>, per_page: usize) -> Self {
        Self {
            sizes,
            per_page: per_page.max(1),
            page: 0,
            sub_page: 0,
            showing_categories: false,
        }
    }

    fn max_page(&self) -> usize {
        self.sizes.len().saturating_sub(1)
    }

    /// Last sub-page index of a page (0 for empty pages).
    pub fn max_sub_page(&self, page: usize) -> usize {
        let len = self.sizes.get(page).copied().unwrap_or(0);
        len.div_ceil(self.per_page).saturating_sub(1)
    }

    /// Forward one sub-page, rolling into the next page and wrapping to the
    /// first page at the end. From the category listing, returns to the
    /// current page.
    pub fn next(&mut self) {
        if !self.showing_categories {
            if self.sub_page < self.max_sub_page(self.page) {
                self.sub_page += 1;
            } else if self.page < self.max_page() {
                self.page += 1;
                self.sub_page = 0;
            } else {
                self.page = 0;
                self.sub_page = 0;
            }
        }
        self.showing_categories = false;
    }

    /// Back one sub-page, rolling into the previous page's last sub-page and
    /// wrapping to the last page at the start.
    pub fn prev(&mut self) {
        if !self.showing_categories {
            if self.sub_page > 0 {
                self.sub_page -= 1;
            } else if self.page > 0 {
                self.page -= 1;
                self.sub_page = self.max_sub_page(self.page);
            } else {
                self.page = self.max_page();
                self.sub_page = self.max_sub_page(self.page);
            }
        }
        self.showing_categories = false;
    }

    pub fn jump_to(&mut self, page: usize) {
        self.page = page.min(self.max_page());
        self.sub_page = 0;
        self.showing_categories = false;
    }

    pub fn show_categories(&mut self) {
        self.showing_categories = true;
    }

    /// Item range of the current sub-page.
    pub fn range(&self) -> std::ops::Range<usize> {
        let len = self.sizes.get(self.page).copied().unwrap_or(0);
        let start = (self.sub_page * self.per_page).min(len);
        start..(start + self.per_page).min(len)
    }
}

/// A guided wizard over one page message.
pub struct ReactionMenu {
    ctx: PageContext,
    page: Page<MenuButton>,
    color: Option<u32>,
}

impl ReactionMenu {
    pub fn new(ctx: PageContext) -> Self {
        Self {
            ctx,
            page: Page::new().edit_in_place().cancel_emoji(STOP_EMOJI),
            color: None,
        }
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.page = self.page.timeout(timeout);
        self
    }

    pub fn context(&self) -> &PageContext {
        &self.ctx
    }

    fn embed(&self, title: &str, description: String) -> Embed {
        let embed = Embed::std(Some(title), Some(&description));
        match self.color {
            Some(c) => embed.with_color(c),
            None => embed,
        }
    }

    async fn show(
        &mut self,
        embed: Embed,
        buttons: Vec<(Emoji, MenuButton)>,
    ) -> Result<Option<Response<MenuButton>>, Error> {
        self.page.update_buttons(&self.ctx, buttons).await?;
        Ok(self
            .page
            .run(&self.ctx, Some(embed))
            .await?
            .map(|r| r.response))
    }

    /// Pick one of up to nine options, by keycap or by typing its number.
    /// Invalid replies re-render the step with an error line.
    pub async fn choose(
        &mut self,
        title: &str,
        description: &str,
        options: &[String],
    ) -> Result<Option<usize>, Error> {
        let shown = &options[..options.len().min(MAX_PER_PAGE)];
        let mut error: Option<String> = None;
        loop {
            let mut text = String::new();
            if let Some(err) = error.take() {
                text.push_str(&format!("⚠ {err}\n\n"));
            }
            text.push_str(description);
            text.push_str("\n\n");
            for (i, option) in shown.iter().enumerate() {
                text.push_str(&format!("{} {option}\n", NUMBER_EMOJIS[i + 1]));
            }

            let embed = self.embed(title, text);
            match self.show(embed, number_buttons(shown.len())).await? {
                None => return Ok(None),
                Some(Response::Button(MenuButton::Pick(i))) if i < shown.len() => {
                    return Ok(Some(i));
                }
                Some(Response::Text(t)) => match t.trim().parse::<usize>() {
                    Ok(n) if (1..=shown.len()).contains(&n) => return Ok(Some(n - 1)),
                    _ => error = Some(format!("`{}` is not a valid choice.", t.trim())),
                },
                Some(Response::Button(_)) => {}
            }
        }
    }

    /// Ask for free text.
    pub async fn ask_text(&mut self, title: &str, description: &str) -> Result<Option<String>, Error> {
        loop {
            let embed = self.embed(title, description.to_string());
            match self.show(embed, Vec::new()).await? {
                None => return Ok(None),
                Some(Response::Text(t)) if !t.trim().is_empty() => return Ok(Some(t)),
                Some(_) => {}
            }
        }
    }

    /// Yes/no step: ✅ or "yes" confirms, the stop button or "no" declines.
    pub async fn confirm(&mut self, title: &str, description: &str) -> Result<bool, Error> {
        loop {
            let embed = self.embed(
                title,
                format!("{description}\n\nClick {CONFIRM_EMOJI} to confirm or {STOP_EMOJI} to cancel."),
            );
            let buttons = vec![(Emoji::new(CONFIRM_EMOJI), MenuButton::Pick(0))];
            match self.show(embed, buttons).await? {
                None => return Ok(false),
                Some(Response::Button(MenuButton::Pick(0))) => return Ok(true),
                Some(Response::Text(t)) => match t.trim().to_lowercase().as_str() {
                    "yes" | "y" => return Ok(true),
                    "no" | "n" => return Ok(false),
                    _ => {}
                },
                Some(_) => {}
            }
        }
    }

    /// Browse categories of items page by page until the user stops or the
    /// page times out.
    pub async fn browse(
        &mut self,
        title: &str,
        categories: &[(String, Vec<String>)],
    ) -> Result<(), Error> {
        let mut cursor = PageCursor::new(
            categories.iter().map(|(_, items)| items.len()).collect(),
            MAX_PER_PAGE,
        );

        loop {
            let (embed, buttons) = if cursor.showing_categories {
                let mut buttons = nav_buttons();
                buttons.extend(number_buttons(categories.len()));
                (self.category_listing(categories), buttons)
            } else {
                (self.item_page(title, categories, &cursor), nav_buttons())
            };

            match self.show(embed, buttons).await? {
                None => break,
                Some(Response::Button(MenuButton::Left)) => cursor.prev(),
                Some(Response::Button(MenuButton::Right)) => cursor.next(),
                Some(Response::Button(MenuButton::Categories)) => cursor.show_categories(),
                Some(Response::Button(MenuButton::Pick(i))) => {
                    if cursor.showing_categories && i < categories.len() {
                        cursor.jump_to(i);
                    }
                }
                Some(Response::Text(_)) => {}
            }
            debug!(page = cursor.page, sub_page = cursor.sub_page, "Menu moved");
        }

        self.page.finish(&self.ctx, None).await;
        Ok(())
    }

    fn category_listing(&self, categories: &[(String, Vec<String>)]) -> Embed {
        let mut embed = self.embed(
            "Jump to a Category",
            format!(
                "*Click* on the associated react to jump to a category.\n\
                 *Click* on {STOP_EMOJI} to stop.\n\
                 *Click* on {CATEGORY_EMOJI} to return to the category listing.\n\
                 *Click* on {LEFT_EMOJI} / {RIGHT_EMOJI} to navigate through the pages.\n"
            ),
        );
        let listing: Vec<String> = categories
            .iter()
            .take(MAX_PER_PAGE)
            .enumerate()
            .map(|(i, (name, _))| format!("{} __**{name}**__", NUMBER_EMOJIS[i + 1]))
            .collect();
        let value = if listing.is_empty() {
            "*No Categories*".to_string()
        } else {
            listing.join("\n")
        };
        embed.add_field(ZERO_WIDTH_SPACE, value, false);
        embed
    }

    fn item_page(&self, title: &str, categories: &[(String, Vec<String>)], cursor: &PageCursor) -> Embed {
        let Some((name, items)) = categories.get(cursor.page) else {
            return self.embed(title, "*Nothing to show*".to_string());
        };
        let range = cursor.range();
        let lines: Vec<String> = items[range.clone()]
            .iter()
            .enumerate()
            .map(|(i, item)| format!("**{}.** {item}", range.start + i + 1))
            .collect();
        let body = if lines.is_empty() {
            "*No entries*".to_string()
        } else {
            lines.join("\n")
        };
        self.embed(&format!("{title}: {name}"), body).with_footer(format!(
            "Page {}/{} • Part {}/{}",
            cursor.page + 1,
            categories.len(),
            cursor.sub_page + 1,
            cursor.max_sub_page(cursor.page) + 1
        ))
    }

    /// Show a final embed and strip the buttons.
    pub async fn done(&mut self, title: &str, description: &str) {
        let embed = self.embed(title, description.to_string());
        self.page.finish(&self.ctx, Some(embed)).await;
    }

    /// Abort the flow with a "Canceled" notice.
    pub async fn cancel(&mut self) {
        let embed = Embed::std(Some("Canceled"), None).with_color(LIGHT_GREY);
        self.page.finish(&self.ctx, Some(embed)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use crate::chat::model::{
        Author, ChannelId, ChatEvent, ChatMessage, GuildId, MessageId, ReactionEvent, UserId,
    };
    use crate::chat::{EventBus, MemoryPlatform};

    #[test]
    fn cursor_walks_sub_pages_and_wraps() {
        // 12 items -> two sub-pages, 3 items -> one, 0 items -> one.
        let mut c = PageCursor::new(vec![12, 3, 0], 9);
        assert_eq!(c.range(), 0..9);
        c.next();
        assert_eq!((c.page, c.sub_page), (0, 1));
        assert_eq!(c.range(), 9..12);
        c.next();
        assert_eq!((c.page, c.sub_page), (1, 0));
        c.next();
        assert_eq!((c.page, c.sub_page), (2, 0));
        assert_eq!(c.range(), 0..0);
        c.next();
        assert_eq!((c.page, c.sub_page), (0, 0));
    }

    #[test]
    fn cursor_prev_wraps_to_last_sub_page() {
        let mut c = PageCursor::new(vec![3, 20], 9);
        c.prev();
        assert_eq!((c.page, c.sub_page), (1, 2));
        c.prev();
        assert_eq!((c.page, c.sub_page), (1, 1));
        c.prev();
        c.prev();
        assert_eq!((c.page, c.sub_page), (0, 0));
    }

    #[test]
    fn cursor_category_listing_returns_in_place() {
        let mut c = PageCursor::new(vec![3, 20], 9);
        c.jump_to(1);
        c.next();
        c.show_categories();
        c.next();
        assert_eq!((c.page, c.sub_page), (1, 1));
        assert!(!c.showing_categories);

        c.jump_to(7);
        assert_eq!((c.page, c.sub_page), (1, 0));
    }

    const USER: UserId = UserId(50);
    const CHANNEL: ChannelId = ChannelId(100);

    fn menu() -> (Arc<MemoryPlatform>, EventBus, ReactionMenu) {
        let platform = Arc::new(MemoryPlatform::new(UserId(1)));
        platform.add_channel(GuildId(9), CHANNEL, "menu");
        let bus = EventBus::new();
        let ctx = PageContext {
            platform: platform.clone(),
            bus: bus.clone(),
            channel: CHANNEL,
            requester: USER,
            prefix: ";".into(),
        };
        let menu = ReactionMenu::new(ctx).with_timeout(Duration::from_secs(2));
        (platform, bus, menu)
    }

    async fn wait_subscribed(bus: &EventBus) {
        while bus.waiter_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn typed(content: &str, id: u64) -> ChatEvent {
        ChatEvent::MessageReceived(ChatMessage {
            id: MessageId(id),
            channel_id: CHANNEL,
            guild_id: Some(GuildId(9)),
            author: Author {
                id: USER,
                display_name: "user".into(),
                avatar_url: None,
                bot: false,
            },
            content: content.into(),
            embeds: vec![],
            role_mentions: vec![],
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn choose_reprompts_on_invalid_number() {
        let (platform, bus, mut menu) = menu();
        let task = tokio::spawn(async move {
            let options = vec!["add".to_string(), "remove".to_string()];
            let picked = menu.choose("Edit", "What now?", &options).await;
            (picked, menu)
        });

        wait_subscribed(&bus).await;
        bus.publish(typed("7", 1));
        // Let the page re-render with the error before answering again.
        loop {
            let embeds = platform.bot_embeds(CHANNEL);
            if embeds
                .last()
                .and_then(|e| e.description.clone())
                .is_some_and(|d| d.contains("not a valid choice"))
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        wait_subscribed(&bus).await;
        bus.publish(typed("2", 2));

        let (picked, _menu) = task.await.unwrap();
        assert_eq!(picked.unwrap(), Some(1));
        // Edit in place: one page message for both renders.
        assert_eq!(platform.bot_embeds(CHANNEL).len(), 1);
    }

    #[tokio::test]
    async fn stop_button_cancels_choose() {
        let (platform, bus, mut menu) = menu();
        let task = tokio::spawn(async move {
            let options = vec!["only".to_string()];
            let picked = menu.choose("Edit", "Pick", &options).await;
            menu.cancel().await;
            picked
        });

        wait_subscribed(&bus).await;
        let msg = loop {
            if let Some(m) = platform.last_message(CHANNEL) {
                break m.id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        bus.publish(ChatEvent::ReactionAdded(ReactionEvent {
            user_id: USER,
            channel_id: CHANNEL,
            message_id: msg,
            guild_id: None,
            emoji: Emoji::new(STOP_EMOJI),
        }));

        assert_eq!(task.await.unwrap().unwrap(), None);
        let last = platform.bot_embeds(CHANNEL).pop().unwrap();
        assert_eq!(last.title.as_deref(), Some("Canceled"));
    }
}
