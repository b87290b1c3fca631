//! Notification message rendering.
//!
//! Subjects carry a category tag: `DROP` for date events, `BINGE` for
//! binge-ready and concluded series, `UPDATE` for everything else.

use serde_json::Value;
use dropbinge_core::changes::{EventType, FIELD_NEXT_AIR_DATE};
use dropbinge_core::media::{TARGET_MOVIE, TARGET_TV_FULL, TARGET_TV_SEASON};

use crate::payload::OutboxPayload;

const BRAND: &str = "DropBinge";
const UNTITLED: &str = "Untitled";
const UNKNOWN: &str = "unknown";
const FOOTER: &str = "You are receiving this because you follow this title in DropBinge.";

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Renders outbox payloads. Deep links are only added when an app base URL
/// is configured.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    app_base_url: Option<String>,
}

impl TemplateRenderer {
    pub fn new(app_base_url: Option<String>) -> Self {
        let app_base_url = app_base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        Self { app_base_url }
    }

    /// Parse and render a stored payload.
    pub fn render_value(&self, payload: &Value) -> Result<RenderedMessage, serde_json::Error> {
        OutboxPayload::from_value(payload).map(|parsed| self.render(&parsed))
    }

    pub fn render(&self, payload: &OutboxPayload) -> RenderedMessage {
        let event_type = payload
            .event_type
            .as_deref()
            .and_then(|s| s.parse::<EventType>().ok());
        let title = payload.title.as_deref().unwrap_or(UNTITLED);
        let field_or_unknown =
            |name: &str| payload.event_field(name).unwrap_or_else(|| UNKNOWN.into());

        let mut lines = vec![
            format!("Title: {title}"),
            format!(
                "Target: {}",
                target_label(payload.target_type.as_deref(), payload.season_number)
            ),
        ];

        match event_type {
            Some(EventType::DateSet) => {
                if let Some(label) = payload.event_field("field").map(|f| field_label(&f)) {
                    lines.push(format!("Field: {label}"));
                }
                lines.push(format!("To: {}", field_or_unknown("to")));
            }
            Some(EventType::DateChanged) => {
                if let Some(label) = payload.event_field("field").map(|f| field_label(&f)) {
                    lines.push(format!("Field: {label}"));
                }
                lines.push(format!("From: {}", field_or_unknown("from")));
                lines.push(format!("To: {}", field_or_unknown("to")));
            }
            Some(EventType::SeasonBingeReady) => {
                lines.push(format!(
                    "Last episode air date: {}",
                    field_or_unknown("last_episode_air_date")
                ));
            }
            Some(EventType::FullRunConcluded | EventType::StatusMilestone) => {
                lines.push(format!("From: {}", field_or_unknown("from")));
                lines.push(format!("To: {}", field_or_unknown("to")));
            }
            None => {}
        }

        let link = self.deep_link(payload);
        if let Some(link) = &link {
            lines.push(format!("Link: {link}"));
        }
        lines.push(FOOTER.to_string());

        let html = lines
            .iter()
            .map(|line| match &link {
                Some(link) if line.starts_with("Link: ") => {
                    let link = escape_html(link);
                    format!("<p>Link: <a href=\"{link}\">{link}</a></p>")
                }
                _ => format!("<p>{}</p>", escape_html(line)),
            })
            .collect::<Vec<_>>()
            .join("\n");

        RenderedMessage {
            subject: subject(event_type, title),
            text: lines.join("\n"),
            html,
        }
    }

    fn deep_link(&self, payload: &OutboxPayload) -> Option<String> {
        let base = self.app_base_url.as_deref()?;
        let id = payload.external_id?;
        match payload.target_type.as_deref()? {
            TARGET_MOVIE => Some(format!("{base}/title/movie/{id}")),
            TARGET_TV_FULL => Some(format!("{base}/title/tv/{id}")),
            TARGET_TV_SEASON => payload
                .season_number
                .map(|season| format!("{base}/title/tv/{id}/season/{season}")),
            _ => None,
        }
    }
}

fn subject(event_type: Option<EventType>, title: &str) -> String {
    let (tag, what) = match event_type {
        Some(EventType::DateSet) => ("DROP", "Date set"),
        Some(EventType::DateChanged) => ("DROP", "Date changed"),
        Some(EventType::SeasonBingeReady) => ("BINGE", "Season ready"),
        Some(EventType::FullRunConcluded) => ("BINGE", "Series concluded"),
        Some(EventType::StatusMilestone) => ("UPDATE", "Status changed"),
        None => ("UPDATE", "Activity update"),
    };
    format!("[{BRAND}] {tag} \u{2014} {title} \u{2014} {what}")
}

fn target_label(target_type: Option<&str>, season_number: Option<i32>) -> String {
    match (target_type, season_number) {
        (Some(TARGET_MOVIE), _) => "Movie".into(),
        (Some(TARGET_TV_FULL), _) => "TV Series".into(),
        (Some(TARGET_TV_SEASON), Some(season)) => format!("TV Season {season}"),
        (Some(TARGET_TV_SEASON), None) => "TV Season".into(),
        _ => "Title".into(),
    }
}

/// `next_air_date` reads as "Next episode date"; other names are title-cased.
fn field_label(field: &str) -> String {
    if field == FIELD_NEXT_AIR_DATE {
        return "Next episode date".into();
    }
    field
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
