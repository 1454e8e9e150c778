//! Text rendering for command output.

use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::model::{Conversation, Message};
use crate::util::format_slack_time;

/// `<@U123>` or `<@U123|label>`.
static USER_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@([A-Z0-9]+)(?:\|[^>]*)?>").unwrap());

/// Output of a filter that matched nothing.
pub const NO_MATCHES: &str = "No matches found.";

/// Replace user mentions with `@name` where the name is known.
pub fn resolve_mentions<N>(text: &str, names: N) -> String
where
    N: Fn(&str) -> Option<String>,
{
    USER_MENTION
        .replace_all(text, |caps: &Captures<'_>| match names(&caps[1]) {
            Some(name) => format!("@{name}"),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// User IDs mentioned in `text`, in order of appearance.
pub fn mentioned_users(text: &str) -> Vec<String> {
    USER_MENTION
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Whether `text` pings `user_id` directly or the whole room.
pub fn is_mention(text: &str, user_id: &str) -> bool {
    if ["<!here>", "<!channel>", "<!everyone>"]
        .iter()
        .any(|tag| text.contains(tag))
    {
        return true;
    }
    !user_id.is_empty() && mentioned_users(text).iter().any(|id| id == user_id)
}

/// Sigil shown before a channel name.
pub fn channel_sigil(conversation: &Conversation) -> &'static str {
    if conversation.is_private() {
        "🔒"
    } else {
        "#"
    }
}

fn dm_label<N>(dm: &Conversation, names: &N) -> String
where
    N: Fn(&str) -> Option<String>,
{
    match &dm.user_id {
        Some(user) => names(user).unwrap_or_else(|| user.clone()),
        None => dm.name.clone(),
    }
}

/// Channels followed by DMs.
pub fn format_channel_list<N>(channels: &[Conversation], dms: &[Conversation], names: N) -> String
where
    N: Fn(&str) -> Option<String>,
{
    let mut out = String::new();

    if !channels.is_empty() {
        out.push_str("Channels:\n");
        for channel in channels {
            let _ = writeln!(out, "  {} {}", channel_sigil(channel), channel.name);
        }
    }

    if !dms.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("Direct Messages:\n");
        for dm in dms {
            let _ = writeln!(out, "  @ {}", dm_label(dm, &names));
        }
    }

    if out.is_empty() {
        return "No channels found.".to_string();
    }
    out
}

/// DMs only.
pub fn format_dm_list<N>(dms: &[Conversation], names: N) -> String
where
    N: Fn(&str) -> Option<String>,
{
    if dms.is_empty() {
        return "No direct messages found.".to_string();
    }

    let mut out = String::from("Direct Messages:\n");
    for dm in dms {
        let _ = writeln!(out, "  @ {}", dm_label(dm, &names));
    }
    out
}

/// Display name of a message author.
pub fn author_name<N>(message: &Message, names: &N) -> String
where
    N: Fn(&str) -> Option<String>,
{
    if message.is_bot {
        if let Some(bot) = message.bot_name.as_deref().filter(|n| !n.is_empty()) {
            return bot.to_string();
        }
    }
    if message.user.is_empty() {
        return "bot".to_string();
    }
    names(&message.user).unwrap_or_else(|| message.user.clone())
}

/// Messages with attachments, reactions and reply counts.
pub fn format_messages<N>(messages: &[Message], names: N) -> String
where
    N: Fn(&str) -> Option<String>,
{
    if messages.is_empty() {
        return "No messages.".to_string();
    }

    let mut out = String::new();
    for message in messages {
        let _ = writeln!(
            out,
            "[{}] {}: {}",
            format_slack_time(&message.ts),
            author_name(message, &names),
            resolve_mentions(&message.text, &names)
        );

        for attachment in &message.attachments {
            if !attachment.title.is_empty() {
                let _ = writeln!(out, "        📎 {}", attachment.title);
            }
            if !attachment.text.is_empty() {
                let _ = writeln!(out, "           {}", attachment.text);
            }
        }

        if !message.reactions.is_empty() {
            let reactions: Vec<String> = message
                .reactions
                .iter()
                .map(|r| format!(":{}: {}", r.name, r.count))
                .collect();
            let _ = writeln!(out, "        {}", reactions.join(" "));
        }

        if message.reply_count > 0 {
            let _ = writeln!(out, "        └─ {} replies", message.reply_count);
        }
    }
    out
}

/// Lines of `input` containing `pattern`, ignoring case.
///
/// Without a pattern the input passes through unchanged.
pub fn grep(input: &str, pattern: Option<&str>) -> String {
    let Some(pattern) = pattern else {
        return input.to_string();
    };
    let needle = pattern.to_lowercase();

    let matched: Vec<&str> = input
        .lines()
        .filter(|line| line.to_lowercase().contains(&needle))
        .collect();

    if matched.is_empty() {
        NO_MATCHES.to_string()
    } else {
        matched.join("\n")
    }
}

/// The `help` command table.
pub fn help_text() -> &'static str {
    "Available commands:

  ls              List channels and DMs (uses cache)
  ls -r           List channels and DMs (refresh cache)
  ls dm           List DMs only
  cd #channel     Enter a channel
  cd @user        Enter a DM
  ..              Go back to channel list
  cat             Show messages (default 20)
  cat -n 50       Show 50 messages
  browse          Interactive message browser
                  (j/k: navigate, Enter: view thread, r: reply, q: exit)
  live            Live mode with real-time updates and message sending
                  (i: new message, Enter: view thread, r: reply, e: edit,
                   d: delete, n: notifications, j/k: navigate, q: exit)
  tail            Same as live
  send <message>  Send a message
  pwd             Show current channel
  source <file>   Switch workspace using config file
  version         Show version
  help            Show this help
  exit            Exit the application

Pipe support:
  ls | grep <pattern>     Search channels/DMs by name
  cat | grep <pattern>    Search messages by content

Keyboard shortcuts:
  Ctrl+L                  Clear screen
  Ctrl+C                  Exit application
  Tab                     Auto-complete
  Up/Down                 Navigate command history
"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attachment, Reaction};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn names() -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&str, &str> = [("U1", "alice"), ("U2", "bob")].into_iter().collect();
        move |id| map.get(id).map(|s| s.to_string())
    }

    #[test]
    fn test_resolve_mentions() {
        assert_eq!(
            resolve_mentions("hi <@U1> and <@U2|robert> and <@U9>", names()),
            "hi @alice and @bob and <@U9>"
        );
    }

    #[test]
    fn test_is_mention() {
        assert!(is_mention("<!here> standup", "U1"));
        assert!(is_mention("ping <@U1|alice>", "U1"));
        assert!(!is_mention("ping <@U2>", "U1"));
        assert!(!is_mention("plain text", ""));
    }

    #[test]
    fn test_channel_list() {
        let channels = vec![
            Conversation::channel("C1", "general"),
            Conversation::channel("G1", "ops").private(),
        ];
        let dms = vec![Conversation::direct("D1", "U2"), Conversation::direct("D2", "U7")];

        assert_eq!(
            format_channel_list(&channels, &dms, names()),
            "Channels:\n  # general\n  🔒 ops\n\nDirect Messages:\n  @ bob\n  @ U7\n"
        );
        assert_eq!(format_channel_list(&[], &[], names()), "No channels found.");
        assert_eq!(format_dm_list(&[], names()), "No direct messages found.");
        assert_eq!(format_channel_list(&[], &dms[..1], names()), "Direct Messages:\n  @ bob\n");
    }

    #[test]
    fn test_format_messages_details() {
        let mut message = Message::new("1700000000.000100", "U1", "see <@U2>");
        message.attachments.push(Attachment {
            title: "report.pdf".into(),
            text: "quarterly".into(),
        });
        message.reactions.push(Reaction {
            name: "tada".into(),
            count: 2,
            users: vec![],
        });
        message.reply_count = 3;

        let out = format_messages(&[message], names());
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].ends_with("] alice: see @bob"));
        assert_eq!(lines[1], "        📎 report.pdf");
        assert_eq!(lines[2], "           quarterly");
        assert_eq!(lines[3], "        :tada: 2");
        assert_eq!(lines[4], "        └─ 3 replies");

        assert_eq!(format_messages(&[], names()), "No messages.");
    }

    #[test]
    fn test_bot_author() {
        let mut message = Message::new("1.0", "", "built");
        message.is_bot = true;
        message.bot_name = Some("ci".into());
        assert_eq!(author_name(&message, &names()), "ci");

        message.bot_name = None;
        assert_eq!(author_name(&message, &names()), "bot");
    }

    #[test]
    fn test_grep() {
        let input = "  # general\n  # dev-backend\n  # Dev-frontend\n  # random";
        assert_eq!(grep(input, Some("DEV")), "  # dev-backend\n  # Dev-frontend");
        assert_eq!(grep(input, Some("zzz")), NO_MATCHES);
        assert_eq!(grep(input, None), input);
    }
}
