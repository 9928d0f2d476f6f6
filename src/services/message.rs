// src/services/message.rs

//! Notification message rendering.

use chrono::NaiveDate;

use crate::models::{EventRecord, SourceConfig};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const NO_DESCRIPTION: &str = "No description available";
const ACCENT: &str = "#ff6b35";

/// A rendered notification, ready for any transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub subject: String,
    /// Plain-text body
    pub text: String,
    /// HTML body
    pub html: String,
}

impl NotificationMessage {
    /// Render a message announcing `events`.
    pub fn render(
        events: &[EventRecord],
        source: &SourceConfig,
        footer: Option<&str>,
        today: NaiveDate,
    ) -> Self {
        Self {
            subject: format!(
                "New event(s) on {} - {}",
                source.name,
                today.format("%Y-%m-%d")
            ),
            text: render_text(events, source, footer),
            html: render_html(events, source, footer),
        }
    }
}

fn render_text(events: &[EventRecord], source: &SourceConfig, footer: Option<&str>) -> String {
    let mut out = format!("New events have been added to the {} website!\n\n", source.name);

    for event in events {
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!("Event: {}\n", event.title));
        out.push_str(&format!("Date: {}\n", event.date));
        out.push_str(&format!(
            "Description: {}\n",
            event.description.as_deref().unwrap_or(NO_DESCRIPTION)
        ));
        out.push_str(&format!(
            "Link: {}\n\n",
            event.url.as_deref().unwrap_or(&source.url)
        ));
    }

    out.push_str(&format!("\nVisit the events page: {}\n", source.url));
    if let Some(footer) = footer {
        out.push_str(&format!("\n{RULE}\n{}\n", footer.trim_end()));
    }
    out
}

fn render_html(events: &[EventRecord], source: &SourceConfig, footer: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str("<html>\n  <body style=\"font-family: Arial, sans-serif;\">\n");
    out.push_str(&format!(
        "    <h2 style=\"color: {ACCENT};\">New Events on {}</h2>\n",
        escape_html(&source.name)
    ));
    out.push_str("    <p>The following new event(s) have been discovered:</p>\n");

    for event in events {
        let link = event.url.as_deref().unwrap_or(&source.url);
        out.push_str(&format!(
            "    <div style=\"margin: 20px 0; padding: 15px; border-left: 4px solid {ACCENT}; background-color: #f9f9f9;\">\n"
        ));
        out.push_str(&format!(
            "      <h3 style=\"color: #333; margin-top: 0;\">{}</h3>\n",
            escape_html(&event.title)
        ));
        out.push_str(&format!(
            "      <p><strong>Date:</strong> {}</p>\n",
            escape_html(&event.date)
        ));
        out.push_str(&format!(
            "      <p><strong>Description:</strong> {}</p>\n",
            escape_html(event.description.as_deref().unwrap_or(NO_DESCRIPTION))
        ));
        out.push_str(&format!(
            "      <p><a href=\"{}\" style=\"color: {ACCENT}; text-decoration: none;\">View Event Details &rarr;</a></p>\n",
            escape_html(link)
        ));
        out.push_str("    </div>\n");
    }

    out.push_str(&format!(
        "    <p style=\"margin-top: 30px;\"><a href=\"{}\" style=\"display: inline-block; padding: 10px 20px; background-color: {ACCENT}; color: white; text-decoration: none; border-radius: 5px;\">Visit Events Page</a></p>\n",
        escape_html(&source.url)
    ));
    if let Some(footer) = footer {
        let lines: Vec<String> = footer.trim_end().lines().map(escape_html).collect();
        out.push_str(&format!(
            "    <hr style=\"margin-top: 30px; border: none; border-top: 1px solid #ddd;\">\n    <p style=\"color: #8b4513; font-size: 14px; font-style: italic; text-align: center;\">{}</p>\n",
            lines.join("<br>")
        ));
    }
    out.push_str(
        "    <p style=\"color: #999; font-size: 11px; margin-top: 20px; text-align: center;\">This is an automated notification from your events tracker.</p>\n",
    );
    out.push_str("  </body>\n</html>\n");
    out
}

/// Escape text for use in HTML element content and quoted attributes.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
