//! Lifecycle email bodies.

use crate::config::BrandingConfig;
use crate::models::{DemoLinks, Project, Subject};
use crate::sender::OutboundEmail;
use crate::snapshot::TriggerSnapshot;

/// Render the email for `snapshot`'s event, addressed to `subject`.
pub fn render(
    subject: &Subject,
    snapshot: &TriggerSnapshot,
    branding: &BrandingConfig,
) -> OutboundEmail {
    let (title, html_body, text_body) = match snapshot {
        TriggerSnapshot::DemoReady(links) => demo_ready(subject, links, branding),
        TriggerSnapshot::WebsiteLaunch(project) => website_launch(subject, project, branding),
    };

    let html = format!(
        "<!DOCTYPE html><html><body style=\"font-family:sans-serif;line-height:1.5\">\
         {html_body}<p>The {brand} team</p></body></html>",
        brand = escape(&branding.brand_name),
    );
    let text = format!("{text_body}\n\nThe {} team\n", branding.brand_name);

    OutboundEmail {
        to: subject.email.clone(),
        subject: title,
        html,
        text,
        tags: vec![
            (
                "event_type".to_string(),
                snapshot.event_type().as_str().to_string(),
            ),
            ("subject_id".to_string(), subject.id.to_string()),
        ],
    }
}

fn demo_ready(
    subject: &Subject,
    links: &DemoLinks,
    branding: &BrandingConfig,
) -> (String, String, String) {
    let title = format!("Your {} website demos are ready", branding.brand_name);
    let name = subject.display_name();

    let mut html = format!(
        "<p>Hi {},</p><p>We've prepared three design options for your new website. \
         Take a look and pick your favourite:</p><ol>",
        escape(name)
    );
    let mut text = format!(
        "Hi {name},\n\nWe've prepared three design options for your new website. \
         Take a look and pick your favourite:\n"
    );
    for (i, (_, url)) in links.options().into_iter().enumerate() {
        let url = url.unwrap_or_default();
        html.push_str(&format!(
            "<li><a href=\"{0}\">Option {1}</a></li>",
            escape(url),
            i + 1
        ));
        text.push_str(&format!("\n  Option {}: {url}", i + 1));
    }
    html.push_str(&format!(
        "</ol><p>When you've decided, approve your choice from your \
         <a href=\"{0}\">dashboard</a>.</p>",
        escape(&branding.dashboard_url)
    ));
    text.push_str(&format!(
        "\n\nWhen you've decided, approve your choice from your dashboard: {}",
        branding.dashboard_url
    ));

    (title, html, text)
}

fn website_launch(
    subject: &Subject,
    project: &Project,
    branding: &BrandingConfig,
) -> (String, String, String) {
    let title = "Your website is live!".to_string();
    let name = subject.display_name();
    let url = project.final_url.as_deref().unwrap_or_default();

    let html = format!(
        "<p>Hi {0},</p><p>Great news: your website is now live at \
         <a href=\"{1}\">{1}</a>.</p><p>You can manage your site any time from your \
         <a href=\"{2}\">dashboard</a>.</p>",
        escape(name),
        escape(url),
        escape(&branding.dashboard_url)
    );
    let text = format!(
        "Hi {name},\n\nGreat news: your website is now live at {url}.\n\n\
         You can manage your site any time from your dashboard: {}",
        branding.dashboard_url
    );

    (title, html, text)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
