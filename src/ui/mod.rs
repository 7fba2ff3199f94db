//! Reaction-driven interactive UI: single pages and multi-step menus.

pub mod menu;
pub mod page;

pub use menu::{PageCursor, ReactionMenu};
pub use page::{Page, PageContext, PageResponse, Response, confirm};
