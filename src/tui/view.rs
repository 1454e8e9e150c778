//! Conversation view state.
//!
//! A [`ConversationView`] is the loaded message window of one conversation
//! plus its offsets and nested sub-states (thread, compose, delete
//! confirmation). It is plain data: the session decides when to fetch and
//! feeds results back in.

use crate::model::{Conversation, Message};
use crate::shell::ViewMode;
use crate::util::compare_slack_ts;

/// Maximum mention candidates offered.
pub const MAX_MENTION_CANDIDATES: usize = 10;

/// Member list for mention completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Members {
    /// Not requested yet.
    #[default]
    NotLoaded,
    /// Fetch in flight.
    Loading,
    /// Display names in membership order.
    Loaded(Vec<String>),
}

/// What a compose buffer will do on submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeTarget {
    /// New top-level message.
    New,
    /// Reply in the thread rooted at `thread_ts`.
    Reply {
        /// Root timestamp.
        thread_ts: String,
    },
    /// Replace the text of `ts`.
    Edit {
        /// Message timestamp.
        ts: String,
    },
}

/// Active `@` completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionState {
    /// Char index of the `@`.
    pub start: usize,
    /// Text typed after the `@`.
    pub prefix: String,
    /// Matching names.
    pub candidates: Vec<String>,
    /// Highlighted candidate.
    pub selected: usize,
}

/// A compose buffer with a char-indexed cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compose {
    /// Submit behavior.
    pub target: ComposeTarget,
    /// Text.
    pub buffer: String,
    /// Cursor position in chars.
    pub cursor: usize,
    /// Completion popup.
    pub mention: Option<MentionState>,
}

impl Compose {
    /// Empty buffer for `target`.
    pub fn new(target: ComposeTarget) -> Self {
        Self::with_text(target, "")
    }

    /// Pre-filled buffer with the cursor at the end.
    pub fn with_text(target: ComposeTarget, text: &str) -> Self {
        Self {
            target,
            buffer: text.to_string(),
            cursor: text.chars().count(),
            mention: None,
        }
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_index)
            .map_or(self.buffer.len(), |(i, _)| i)
    }

    /// Insert at the cursor.
    pub fn insert(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.buffer.insert(at, c);
        self.cursor += 1;
    }

    /// Delete before the cursor.
    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let at = self.byte_index(self.cursor - 1);
        self.buffer.remove(at);
        self.cursor -= 1;
    }

    /// Cursor left.
    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Cursor right.
    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.buffer.chars().count());
    }

    /// The `@` span ending at the cursor: its char index and the prefix.
    ///
    /// Scans back from the cursor to the nearest `@` with no whitespace in
    /// between; a `@` preceded by `\` does not count.
    pub fn mention_query(&self) -> Option<(usize, String)> {
        let chars: Vec<char> = self.buffer.chars().collect();
        let mut i = self.cursor.min(chars.len());
        while i > 0 {
            i -= 1;
            match chars[i] {
                c if c.is_whitespace() => return None,
                '@' if i > 0 && chars[i - 1] == '\\' => return None,
                '@' => return Some((i, chars[i + 1..self.cursor].iter().collect())),
                _ => {}
            }
        }
        None
    }

    /// Recompute the completion popup against `names`.
    pub fn refresh_mention(&mut self, names: &[String]) {
        self.mention = self.mention_query().map(|(start, prefix)| {
            let candidates = mention_candidates(names, &prefix);
            let selected = match &self.mention {
                Some(old) if old.start == start => old.selected.min(candidates.len().saturating_sub(1)),
                _ => 0,
            };
            MentionState {
                start,
                prefix,
                candidates,
                selected,
            }
        });
    }

    /// Replace the `@prefix` span with the highlighted candidate.
    ///
    /// Returns false when there is nothing to accept.
    pub fn accept_mention(&mut self) -> bool {
        let Some(mention) = self.mention.take() else {
            return false;
        };
        let Some(name) = mention.candidates.get(mention.selected) else {
            self.mention = Some(mention);
            return false;
        };

        let start = self.byte_index(mention.start);
        let end = self.byte_index(self.cursor);
        let replacement = format!("@{name} ");
        self.buffer.replace_range(start..end, &replacement);
        self.cursor = mention.start + replacement.chars().count();
        true
    }

    /// Move the popup highlight.
    pub fn cycle_mention(&mut self, forward: bool) {
        if let Some(mention) = &mut self.mention {
            let count = mention.candidates.len();
            if count == 0 {
                return;
            }
            mention.selected = if forward {
                (mention.selected + 1) % count
            } else {
                (mention.selected + count - 1) % count
            };
        }
    }

    /// Whether the popup has something to offer.
    pub fn has_candidates(&self) -> bool {
        self.mention.as_ref().is_some_and(|m| !m.candidates.is_empty())
    }
}

/// Names starting with `prefix`, ignoring case, in list order.
pub fn mention_candidates(names: &[String], prefix: &str) -> Vec<String> {
    let prefix = prefix.to_lowercase();
    names
        .iter()
        .filter(|name| name.to_lowercase().starts_with(&prefix))
        .take(MAX_MENTION_CANDIDATES)
        .cloned()
        .collect()
}

/// An open thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadView {
    /// Root timestamp.
    pub root_ts: String,
    /// Root and replies, ascending.
    pub messages: Vec<Message>,
    /// Selected reply.
    pub selected: usize,
    /// Fetch in flight.
    pub loading: bool,
}

impl ThreadView {
    fn new(root_ts: String) -> Self {
        Self {
            root_ts,
            messages: Vec::new(),
            selected: 0,
            loading: true,
        }
    }
}

/// Window over one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView {
    /// The conversation.
    pub conversation: Conversation,
    /// Header title.
    pub title: String,
    /// Browse or live.
    pub mode: ViewMode,
    /// Loaded messages, ascending.
    pub messages: Vec<Message>,
    /// Older pages exist.
    pub has_more: bool,
    /// Selected message index.
    pub selected: usize,
    /// Index of the first visible message.
    pub scroll: usize,
    /// Visible message rows.
    pub page_size: usize,
    /// Initial load in flight.
    pub loading: bool,
    /// Older page in flight.
    pub loading_older: bool,
    /// Open thread.
    pub thread: Option<ThreadView>,
    /// Compose buffer.
    pub compose: Option<Compose>,
    /// Message awaiting delete confirmation.
    pub confirm_delete: Option<String>,
    /// Members for mention completion.
    pub members: Members,
    /// One-line status.
    pub status: Option<String>,
}

impl ConversationView {
    /// An empty view waiting for its first page.
    pub fn new(conversation: Conversation, title: String, mode: ViewMode) -> Self {
        Self {
            conversation,
            title,
            mode,
            messages: Vec::new(),
            has_more: false,
            selected: 0,
            scroll: 0,
            page_size: 20,
            loading: true,
            loading_older: false,
            thread: None,
            compose: None,
            confirm_delete: None,
            members: Members::NotLoaded,
            status: None,
        }
    }

    /// Conversation ID.
    pub fn id(&self) -> &str {
        &self.conversation.id
    }

    /// Selected message.
    pub fn selected_message(&self) -> Option<&Message> {
        self.messages.get(self.selected)
    }

    /// Replace the window with the newest page, selecting the newest message.
    pub fn replace(&mut self, messages: Vec<Message>, has_more: bool) {
        self.messages = messages;
        self.has_more = has_more;
        self.loading = false;
        self.loading_older = false;
        self.selected = self.messages.len().saturating_sub(1);
        self.scroll = self.messages.len().saturating_sub(self.page_size);
    }

    /// Put an older page in front, keeping the same message selected.
    ///
    /// Returns how many messages were added.
    pub fn prepend(&mut self, older: Vec<Message>, has_more: bool) -> usize {
        self.loading_older = false;
        self.has_more = has_more;

        let oldest = self.messages.first().map(|m| m.ts.clone());
        let older: Vec<Message> = older
            .into_iter()
            .filter(|m| oldest.as_deref().map_or(true, |o| compare_slack_ts(&m.ts, o).is_lt()))
            .collect();

        let added = older.len();
        self.messages.splice(0..0, older);
        self.selected += added;
        self.scroll += added;
        added
    }

    /// Add a message at the end unless already present.
    pub fn append(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.ts == message.ts) {
            return false;
        }
        let follow = self.selected + 1 >= self.messages.len();
        let at = self
            .messages
            .iter()
            .rposition(|m| compare_slack_ts(&m.ts, &message.ts).is_lt())
            .map_or(0, |i| i + 1);
        self.messages.insert(at, message);
        if follow {
            self.selected = self.messages.len() - 1;
            self.keep_visible();
        } else if at <= self.selected {
            self.selected += 1;
            self.scroll += 1;
        }
        true
    }

    /// Record a reply that arrived for a thread root.
    pub fn add_reply(&mut self, reply: Message) {
        let root = reply.thread_root().to_string();
        if let Some(parent) = self.messages.iter_mut().find(|m| m.ts == root) {
            if let Some(thread) = &self.thread {
                if thread.root_ts == root && thread.messages.iter().any(|m| m.ts == reply.ts) {
                    return;
                }
            }
            parent.reply_count += 1;
            parent.thread_ts.get_or_insert_with(|| root.clone());
        }
        if let Some(thread) = &mut self.thread {
            if thread.root_ts == root && !thread.messages.iter().any(|m| m.ts == reply.ts) {
                thread.messages.push(reply);
            }
        }
    }

    /// Patch a message's text in place.
    pub fn patch_text(&mut self, ts: &str, text: &str) {
        let thread_messages = self.thread.iter_mut().flat_map(|t| t.messages.iter_mut());
        for message in self.messages.iter_mut().chain(thread_messages) {
            if message.ts == ts {
                message.text = text.to_string();
            }
        }
    }

    /// Remove a message in place and clamp the selection.
    pub fn remove(&mut self, ts: &str) {
        if let Some(pos) = self.messages.iter().position(|m| m.ts == ts) {
            self.messages.remove(pos);
            if pos < self.selected {
                self.selected -= 1;
            }
            self.selected = self.selected.min(self.messages.len().saturating_sub(1));
            self.scroll = self.scroll.min(self.selected);
        }

        let root_deleted = self.thread.as_ref().is_some_and(|t| t.root_ts == ts);
        if root_deleted {
            self.thread = None;
        } else if let Some(thread) = &mut self.thread {
            thread.messages.retain(|m| m.ts != ts);
            thread.selected = thread.selected.min(thread.messages.len().saturating_sub(1));
        }
    }

    /// Selection down by one.
    pub fn move_down(&mut self) {
        if let Some(thread) = &mut self.thread {
            if thread.selected + 1 < thread.messages.len() {
                thread.selected += 1;
            }
            return;
        }
        if self.selected + 1 < self.messages.len() {
            self.selected += 1;
            self.keep_visible();
        }
    }

    /// Selection up by one.
    ///
    /// Returns the timestamp to page before when moving past the oldest
    /// loaded message with more history available and no fetch in flight;
    /// the caller schedules the fetch.
    pub fn move_up(&mut self) -> Option<String> {
        if let Some(thread) = &mut self.thread {
            thread.selected = thread.selected.saturating_sub(1);
            return None;
        }
        if self.selected > 0 {
            self.selected -= 1;
            self.keep_visible();
            return None;
        }
        if self.has_more && !self.loading_older && !self.loading {
            let oldest = self.messages.first()?.ts.clone();
            self.loading_older = true;
            return Some(oldest);
        }
        None
    }

    fn keep_visible(&mut self) {
        if self.selected < self.scroll {
            self.scroll = self.selected;
        } else if self.page_size > 0 && self.selected >= self.scroll + self.page_size {
            self.scroll = self.selected + 1 - self.page_size;
        }
    }

    /// Resize the visible window.
    pub fn set_page_size(&mut self, rows: usize) {
        self.page_size = rows.max(1);
        self.keep_visible();
    }

    /// Open the thread rooted at the selected message, if it has replies.
    pub fn open_thread(&mut self) -> Option<String> {
        let message = self.selected_message()?;
        if message.reply_count == 0 {
            return None;
        }
        let root = message.ts.clone();
        self.thread = Some(ThreadView::new(root.clone()));
        Some(root)
    }

    /// Fill the open thread, if it is still `root_ts`.
    pub fn set_thread(&mut self, root_ts: &str, messages: Vec<Message>) -> bool {
        match &mut self.thread {
            Some(thread) if thread.root_ts == root_ts => {
                thread.messages = messages;
                thread.loading = false;
                thread.selected = thread.selected.min(thread.messages.len().saturating_sub(1));
                true
            }
            _ => false,
        }
    }

    /// Root timestamp a reply goes to: the open thread, else the selected
    /// message, which starts a new thread.
    pub fn reply_target(&self) -> Option<String> {
        if let Some(thread) = &self.thread {
            return Some(thread.root_ts.clone());
        }
        self.selected_message().map(|m| m.thread_root().to_string())
    }

    /// The message under the cursor in the thread or the main list.
    pub fn focused_message(&self) -> Option<&Message> {
        match &self.thread {
            Some(thread) => thread.messages.get(thread.selected),
            None => self.selected_message(),
        }
    }

    /// Move the view into a snapshot.
    pub fn snapshot(self) -> ViewSnapshot {
        ViewSnapshot(Box::new(self))
    }
}

/// A suspended view, restored exactly as it was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot(Box<ConversationView>);

impl ViewSnapshot {
    /// Conversation of the suspended view.
    pub fn conversation_id(&self) -> &str {
        self.0.id()
    }

    /// The view as it was.
    pub fn restore(self) -> ConversationView {
        *self.0
    }

    /// The suspended view, for results that land while it is hidden.
    pub fn view_mut(&mut self) -> &mut ConversationView {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn msg(ts: &str) -> Message {
        Message::new(ts, "U1", format!("m{ts}"))
    }

    fn view_with(stamps: &[&str]) -> ConversationView {
        let mut view = ConversationView::new(
            Conversation::channel("C1", "general"),
            "general".into(),
            ViewMode::Live,
        );
        view.page_size = 3;
        view.replace(stamps.iter().map(|ts| msg(ts)).collect(), true);
        view
    }

    #[test]
    fn test_replace_selects_newest() {
        let view = view_with(&["10.0", "11.0", "12.0", "13.0", "14.0"]);
        assert_eq!(view.selected, 4);
        assert_eq!(view.scroll, 2);

        let mut again = view.clone();
        again.replace(view.messages.clone(), true);
        assert_eq!(again, view);
    }

    #[test]
    fn test_prepend_shifts_offsets() {
        let mut view = view_with(&["10.0", "11.0", "12.0", "13.0", "14.0"]);
        view.selected = 1;
        view.scroll = 0;

        let added = view.prepend(vec![msg("7.0"), msg("8.0"), msg("9.0")], false);
        assert_eq!(added, 3);
        assert_eq!(view.selected, 4);
        assert_eq!(view.scroll, 3);
        assert_eq!(view.selected_message().unwrap().ts, "11.0");
        assert!(view
            .messages
            .windows(2)
            .all(|w| compare_slack_ts(&w[0].ts, &w[1].ts).is_lt()));
        assert!(!view.has_more);
    }

    #[test]
    fn test_prepend_skips_overlap() {
        let mut view = view_with(&["10.0", "11.0"]);
        let added = view.prepend(vec![msg("9.0"), msg("10.0")], true);
        assert_eq!(added, 1);
        assert_eq!(view.messages.len(), 3);
    }

    #[test]
    fn test_move_up_requests_one_page() {
        let mut view = view_with(&["10.0", "11.0"]);
        view.selected = 0;
        assert_eq!(view.move_up(), Some("10.0".to_string()));
        assert!(view.loading_older);
        assert_eq!(view.move_up(), None);

        view.prepend(vec![], false);
        assert_eq!(view.move_up(), None);
    }

    #[test]
    fn test_append_dedupes_and_follows() {
        let mut view = view_with(&["10.0", "11.0"]);
        assert!(view.append(msg("12.0")));
        assert!(!view.append(msg("12.0")));
        assert_eq!(view.selected, 2);

        view.selected = 0;
        view.scroll = 0;
        assert!(view.append(msg("13.0")));
        assert_eq!(view.selected, 0);
    }

    #[test]
    fn test_remove_clamps() {
        let mut view = view_with(&["10.0", "11.0", "12.0"]);
        view.remove("12.0");
        assert_eq!(view.selected, 1);
        view.remove("10.0");
        assert_eq!(view.selected, 0);
        assert_eq!(view.messages.len(), 1);
    }

    #[test]
    fn test_replies_update_counts() {
        let mut view = view_with(&["10.0", "11.0"]);
        view.selected = 0;
        view.add_reply(msg("10.5").in_thread("10.0"));
        assert_eq!(view.messages[0].reply_count, 1);

        let root = view.open_thread().unwrap();
        assert_eq!(root, "10.0");
        assert!(view.set_thread("10.0", vec![msg("10.0"), msg("10.5").in_thread("10.0")]));
        view.add_reply(msg("10.5").in_thread("10.0"));
        assert_eq!(view.thread.as_ref().unwrap().messages.len(), 2);
        assert_eq!(view.messages[0].reply_count, 1);
        assert_eq!(view.reply_target().as_deref(), Some("10.0"));
    }

    #[test]
    fn test_mention_candidates_keep_order() {
        let names: Vec<String> = ["alice", "albert", "bob"].iter().map(|s| s.to_string()).collect();
        let mut compose = Compose::with_text(ComposeTarget::New, "hi @al");
        compose.refresh_mention(&names);

        let mention = compose.mention.clone().unwrap();
        assert_eq!(mention.prefix, "al");
        assert_eq!(mention.candidates, vec!["alice", "albert"]);

        assert!(compose.accept_mention());
        assert_eq!(compose.buffer, "hi @alice ");
        assert_eq!(compose.cursor, 10);
        assert!(compose.mention.is_none());
    }

    #[test]
    fn test_mention_query_rules() {
        let query = |text: &str| Compose::with_text(ComposeTarget::New, text).mention_query();
        assert_eq!(query("@"), Some((0, String::new())));
        assert_eq!(query("hi @Al"), Some((3, "Al".to_string())));
        assert_eq!(query("hi @al done"), None);
        assert_eq!(query(r"mail \@al"), None);
        assert_eq!(query("no mention"), None);
    }

    #[test]
    fn test_mention_candidates_capped() {
        let names: Vec<String> = (0..15).map(|i| format!("user{i}")).collect();
        assert_eq!(mention_candidates(&names, "USER").len(), MAX_MENTION_CANDIDATES);
        assert!(mention_candidates(&names, "x").is_empty());
    }

    #[test]
    fn test_compose_editing_multibyte() {
        let mut compose = Compose::new(ComposeTarget::New);
        for c in "héllo".chars() {
            compose.insert(c);
        }
        compose.left();
        compose.backspace();
        assert_eq!(compose.buffer, "hélo");
        assert_eq!(compose.cursor, 3);
    }

    #[test]
    fn test_snapshot_restores_exactly() {
        let mut view = view_with(&["10.0", "11.0", "12.0"]);
        view.selected = 1;
        view.scroll = 1;
        view.status = Some("x".into());
        let before = view.clone();

        let snapshot = view.snapshot();
        assert_eq!(snapshot.conversation_id(), "C1");
        assert_eq!(snapshot.restore(), before);
    }
}
