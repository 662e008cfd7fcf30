use control_server::commands::HandlerResult;
use control_server::dispatch::Update;
use control_server::ControlContext;
use std::sync::Arc;
use std::time::Duration;

pub async fn ping(ctx: Arc<ControlContext>, update: Update, _args: Vec<String>) -> HandlerResult {
    ctx.reply(&update, format!("Pong! Uptime: {}", format_uptime(ctx.uptime())));
    Ok(())
}

pub async fn help(ctx: Arc<ControlContext>, update: Update, _args: Vec<String>) -> HandlerResult {
    let triggers: Vec<String> = ctx
        .registry()
        .triggers()
        .into_iter()
        .map(|trigger| format!("/{}", trigger))
        .collect();
    ctx.reply(&update, format!("Available commands: {}", triggers.join(", ")));
    Ok(())
}

/// Formats a duration as `1d 02h 03m 04s`, omitting leading zero units.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        secs / 3_600 % 24,
        secs / 60 % 60,
        secs % 60,
    );

    if days > 0 {
        format!("{}d {:02}h {:02}m {:02}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(7)), "7s");
        assert_eq!(format_uptime(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_uptime(Duration::from_secs(3_723)), "1h 02m 03s");
        assert_eq!(format_uptime(Duration::from_secs(93_784)), "1d 02h 03m 04s");
    }
}
