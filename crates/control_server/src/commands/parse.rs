//! Trigger and argument parsing for chat messages.

/// A chat message split into its trigger and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Normalized trigger, without the leading `/` or `@bot` suffix
    pub trigger: String,
    /// Remaining whitespace-separated tokens
    pub args: Vec<String>,
    /// Lowercased bot name from a `/trigger@bot` form, if any
    pub mention: Option<String>,
}

impl ParsedCommand {
    /// Whether the command is meant for the bot called `bot_username`.
    ///
    /// Unaddressed commands are for everyone. Addressed ones only match the
    /// configured name; with no name configured every mention is accepted.
    pub fn is_addressed_to(&self, bot_username: Option<&str>) -> bool {
        match (&self.mention, bot_username) {
            (None, _) | (Some(_), None) => true,
            (Some(mention), Some(name)) => {
                *mention == normalize_trigger(name.trim_start_matches('@'))
            }
        }
    }
}

/// Normalizes a trigger the same way for registration and lookup.
pub fn normalize_trigger(trigger: &str) -> String {
    trigger.trim().to_lowercase()
}

/// Splits message text into a trigger and arguments.
///
/// The first whitespace-separated token is the trigger. A leading `/` and an
/// `@bot` suffix are stripped before normalizing. Returns `None` for empty
/// text or a bare `/`.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let mut tokens = text.split_whitespace();
    let first = tokens.next()?;
    let first = first.strip_prefix('/').unwrap_or(first);

    let (trigger, mention) = match first.split_once('@') {
        Some((trigger, mention)) => (trigger, Some(normalize_trigger(mention))),
        None => (first, None),
    };
    if trigger.is_empty() {
        return None;
    }

    Some(ParsedCommand {
        trigger: normalize_trigger(trigger),
        args: tokens.map(str::to_string).collect(),
        mention,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trigger_and_args() {
        let parsed = parse_command("/StartGame  chaos   mode").unwrap();
        assert_eq!(parsed.trigger, "startgame");
        assert_eq!(parsed.args, vec!["chaos", "mode"]);
        assert_eq!(parsed.mention, None);
    }

    #[test]
    fn test_parse_without_slash() {
        let parsed = parse_command("unknowncmd arg1").unwrap();
        assert_eq!(parsed.trigger, "unknowncmd");
        assert_eq!(parsed.args, vec!["arg1"]);
    }

    #[test]
    fn test_parse_bot_mention() {
        let parsed = parse_command("/join@WerewolfBot").unwrap();
        assert_eq!(parsed.trigger, "join");
        assert_eq!(parsed.mention.as_deref(), Some("werewolfbot"));
        assert!(parsed.is_addressed_to(Some("@werewolfbot")));
        assert!(parsed.is_addressed_to(None));
        assert!(!parsed.is_addressed_to(Some("OtherBot")));
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_command("").is_none());
        assert!(parse_command("   ").is_none());
        assert!(parse_command("/").is_none());
        assert!(parse_command("/@bot").is_none());
    }
}
