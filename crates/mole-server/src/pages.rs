//! HTML pages and public URL helpers
//!
//! Stateless glue: nothing here touches slot state.

use mole_rendezvous::SlotId;

/// Public URLs the pages link to
#[derive(Debug, Clone)]
pub struct PageContext {
    /// Base for plain HTTP links
    pub base_url: String,
    /// Base for WebSocket links
    pub ws_base_url: String,
}

impl PageContext {
    /// HTTP URL for `path`
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// WebSocket URL for `path`
    pub fn ws_url(&self, path: &str) -> String {
        join_url(&self.ws_base_url, path)
    }
}

/// Join `path` onto `base` with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        format!("{base}/")
    } else {
        format!("{base}/{path}")
    }
}

/// Escape text for use in HTML content and quoted attributes
pub fn escape_html(raw: &str) -> String {
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

fn layout(ctx: &PageContext, title: &str, body: &str, script: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title}</title>
  <link rel="stylesheet" href="{css}">
</head>
<body>
  <main>
{body}
  </main>
  <script src="{script}"></script>
</body>
</html>
"#,
        title = escape_html(title),
        css = escape_html(&ctx.url("static/mole.css")),
        body = body,
        script = escape_html(&ctx.url(script)),
    )
}

/// Listener page: shows the slot id and where to send a link to it
pub fn render_index(ctx: &PageContext, id: &SlotId) -> String {
    let id = escape_html(&id.to_string());
    let send_url = escape_html(&format!("{}?id={id}", ctx.url("send")));
    let listen_url = escape_html(&ctx.ws_url("listen"));

    let body = format!(
        r#"    <h1>mole</h1>
    <p>Open this link on your other device and paste a URL to send it here:</p>
    <p><a id="send-link" href="{send_url}">{send_url}</a></p>
    <p>Code: <code id="slot-id">{id}</code></p>
    <p id="status" data-listen-url="{listen_url}" data-slot-id="{id}">Waiting for a link&hellip;</p>"#
    );

    layout(ctx, "mole", &body, "static/listen.js")
}

/// Sender page: a form posting `{id, url}` to `/send`
pub fn render_send(ctx: &PageContext) -> String {
    let action = escape_html(&ctx.url("send"));

    let body = format!(
        r#"    <h1>Send a link</h1>
    <form id="send-form" data-action="{action}">
      <label>Code <input name="id" id="id" autocomplete="off" required></label>
      <label>URL <input name="url" id="url" type="url" required></label>
      <button type="submit">Send</button>
    </form>
    <p id="status"></p>"#
    );

    layout(ctx, "mole: send", &body, "static/send.js")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PageContext {
        PageContext {
            base_url: "https://mole.party/".to_string(),
            ws_base_url: "wss://mole.party".to_string(),
        }
    }

    #[test]
    fn test_join_url_uses_single_slash() {
        assert_eq!(join_url("https://mole.party/", "/send"), "https://mole.party/send");
        assert_eq!(join_url("https://mole.party", "send"), "https://mole.party/send");
        assert_eq!(join_url("https://mole.party//", ""), "https://mole.party/");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn test_index_contains_id_and_links() {
        let id = SlotId::generate();
        let page = render_index(&ctx(), &id);

        assert!(page.contains(&format!("<code id=\"slot-id\">{id}</code>")));
        assert!(page.contains(&format!("https://mole.party/send?id={id}")));
        assert!(page.contains("data-listen-url=\"wss://mole.party/listen\""));
        assert!(page.contains("https://mole.party/static/listen.js"));
    }

    #[test]
    fn test_send_page_posts_to_send() {
        let page = render_send(&ctx());
        assert!(page.contains("data-action=\"https://mole.party/send\""));
        assert!(page.contains("static/send.js"));
    }
}
