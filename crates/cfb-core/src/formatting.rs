//! Formatting utilities (Telegram HTML).

use crate::domain::Item;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the alert sent to every subscriber when a new item appears.
pub fn render_notification(item: &Item) -> String {
    let mut out = String::from("🔔 <b>Berita baru</b>\n\n");
    out.push_str(&format!("<b>{}</b>\n", escape_html(item.title.trim())));
    out.push_str(&format!("📰 {}", escape_html(&item.source_name)));
    if let Some(at) = item.published_at {
        out.push_str(&format!(" · {}", at.format("%d %b %Y %H:%M UTC")));
    }
    out.push('\n');
    out.push_str(&format!(
        "🔗 <a href=\"{}\">Baca selengkapnya</a>\n\n",
        escape_html(&item.url)
    ));
    out.push_str("<i>Kirim /unsubscribe untuk berhenti menerima notifikasi.</i>");
    out
}

/// Render a numbered list of items (used by the "latest" style commands).
pub fn render_item_list(heading: &str, items: &[Item]) -> String {
    let mut out = format!("📰 <b>{}</b>\n", escape_html(heading));
    for (idx, item) in items.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. <b>{}:</b> {}\n   <a href=\"{}\">Baca di sini</a>\n",
            idx + 1,
            escape_html(&item.source_name),
            escape_html(item.title.trim()),
            escape_html(&item.url),
        ));
    }
    out.trim_end().to_string()
}

const ELLIPSIS: &str = "…";

/// Cut HTML `text` to at most `limit` bytes, marking the cut.
///
/// The cut never lands inside a tag or an entity, and tags left open by the
/// cut are closed again, so the result still parses as Telegram HTML.
pub fn truncate_message(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }

    let mut end = floor_char_boundary(text, limit.saturating_sub(ELLIPSIS.len()));
    loop {
        end = safe_cut(text, end);
        let head = &text[..end];
        let closers = closing_tags(head);
        if head.len() + ELLIPSIS.len() + closers.len() <= limit {
            return format!("{head}{ELLIPSIS}{closers}");
        }
        if end == 0 {
            return String::new();
        }
        end = floor_char_boundary(text, end - 1);
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Move `end` back so `text[..end]` does not stop inside a tag or entity.
fn safe_cut(text: &str, end: usize) -> usize {
    let mut end = end;
    let head = &text[..end];
    if let Some(lt) = head.rfind('<') {
        if !head[lt..].contains('>') {
            end = lt;
        }
    }
    let head = &text[..end];
    if let Some(amp) = head.rfind('&') {
        if !head[amp..].contains(';') {
            end = amp;
        }
    }
    end
}

/// Closing tags for every element still open at the end of `html`.
fn closing_tags(html: &str) -> String {
    let mut open: Vec<&str> = Vec::new();
    let mut rest = html;
    while let Some(lt) = rest.find('<') {
        let Some(gt) = rest[lt..].find('>') else {
            break;
        };
        let tag = &rest[lt + 1..lt + gt];
        if let Some(name) = tag.strip_prefix('/') {
            let name = name.trim();
            if let Some(pos) = open.iter().rposition(|t| *t == name) {
                open.truncate(pos);
            }
        } else {
            let name = tag.split_whitespace().next().unwrap_or("");
            if !name.is_empty() {
                open.push(name);
            }
        }
        rest = &rest[lt + gt + 1..];
    }
    open.iter().rev().map(|t| format!("</{t}>")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn escapes_html_specials() {
        assert_eq!(escape_html("<a & \"b\">"), "&lt;a &amp; &quot;b&quot;&gt;");
    }

    #[test]
    fn notification_has_title_source_link_and_unsubscribe_hint() {
        let mut item = Item::from_url(
            "https://example.id/a?x=1&y=2",
            "Hoaks <vaksin> beredar",
            "Kompas",
        );
        item.published_at = Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap());

        let html = render_notification(&item);
        assert!(html.contains("<b>Hoaks &lt;vaksin&gt; beredar</b>"));
        assert!(html.contains("Kompas · 01 Mar 2024 08:30 UTC"));
        assert!(html.contains("href=\"https://example.id/a?x=1&amp;y=2\""));
        assert!(html.contains("/unsubscribe"));
    }

    #[test]
    fn item_list_is_numbered() {
        let items = vec![
            Item::from_url("https://a", "A", "SA"),
            Item::from_url("https://b", "B", "SB"),
        ];
        let html = render_item_list("Terbaru", &items);
        assert!(html.starts_with("📰 <b>Terbaru</b>"));
        assert!(html.contains("1. <b>SA:</b> A"));
        assert!(html.contains("2. <b>SB:</b> B"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "ééééé";
        let out = truncate_message(s, 6);
        assert!(out.len() <= 6);
        assert!(out.ends_with('…'));
        assert_eq!(truncate_message("short", 10), "short");
    }

    #[test]
    fn truncation_never_exceeds_tiny_limits() {
        assert_eq!(truncate_message("hello world", 0), "");
        assert_eq!(truncate_message("hello world", 2), "");
        assert_eq!(truncate_message("hello world", 4), "h…");
    }

    #[test]
    fn truncation_closes_open_tags() {
        let out = truncate_message("<b>bold text here</b> tail", 12);
        assert_eq!(out, "<b>bo…</b>");
    }

    #[test]
    fn truncation_does_not_split_entities() {
        let text = "a &amp; b &amp; c &amp; d";
        assert_eq!(truncate_message(text, 10), "a &amp;…");
        // One byte less would end inside "&amp;", so the whole entity goes.
        assert_eq!(truncate_message(text, 9), "a …");
    }

    fn assert_well_formed(html: &str) {
        // Every '<' is closed by a '>' and every '&' by a ';'.
        let mut rest = html;
        while let Some(lt) = rest.find('<') {
            let gt = rest[lt..].find('>').unwrap_or_else(|| panic!("unclosed tag in {html:?}"));
            rest = &rest[lt + gt + 1..];
        }
        let mut rest = html;
        while let Some(amp) = rest.find('&') {
            let semi = rest[amp..].find(';').unwrap_or_else(|| panic!("cut entity in {html:?}"));
            assert!(
                rest[amp + 1..amp + semi].chars().all(|c| c.is_ascii_alphanumeric() || c == '#'),
                "cut entity in {html:?}"
            );
            rest = &rest[amp + semi + 1..];
        }
        for tag in ["b", "i", "a", "code"] {
            let opened = html.matches(&format!("<{tag}>")).count()
                + html.matches(&format!("<{tag} ")).count();
            let closed = html.matches(&format!("</{tag}>")).count();
            assert_eq!(opened, closed, "<{tag}> unbalanced in {html:?}");
        }
    }

    #[test]
    fn truncated_html_stays_well_formed_across_limits() {
        let items: Vec<Item> = (0..5)
            .map(|i| {
                Item::from_url(
                    format!("https://example.id/berita?id={i}&ref=bot"),
                    format!("Cek & ricek <{i}> {}", "x".repeat(400)),
                    "Sumber & Co",
                )
            })
            .collect();
        let list = render_item_list("Terbaru", &items);
        let alert = render_notification(&items[0]);

        for html in [&list, &alert] {
            for limit in 0..=html.len() + 1 {
                let out = truncate_message(html, limit);
                assert!(out.len() <= limit, "limit {limit}: {} bytes", out.len());
                assert_well_formed(&out);
            }
        }
    }
}
