use serenity::builder::{CreateEmbed, CreateEmbedFooter};
use std::time::Duration;

use super::paginator::QueuePage;

pub mod colors {
    use serenity::all::Colour;

    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
}

/// Renders one page of the queue view.
pub fn queue_page_embed(page: &QueuePage) -> CreateEmbed {
    let fields = page.entries.iter().map(|entry| {
        let value = match entry.requested_by {
            Some(user) => format!("{} | requested by <@{}>", entry.length, user),
            None => entry.length.clone(),
        };
        (format!("{}. {}", entry.position, entry.title), value, false)
    });

    CreateEmbed::default()
        .title("Current song queue:")
        .color(colors::INFO_BLUE)
        .fields(fields)
        .footer(CreateEmbedFooter::new(format!(
            "Page {}/{}",
            page.number, page.total_pages
        )))
}

/// `H:MM:SS` from one hour up, `M:SS` below.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
