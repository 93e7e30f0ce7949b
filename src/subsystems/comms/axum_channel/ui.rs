//! Server-rendered chat page.
//!
//! The page is a plain HTML form: pressing Enter in the input and clicking
//! Submit both post to `/chat`, which runs the turn and redirects back. The
//! session id travels in the `session` query parameter and a hidden field.

use axum::{
    Form,
    extract::{Query, State},
    response::{Html, Redirect},
};
use serde::Deserialize;

use super::AxumState;
use crate::subsystems::comms::SessionSnapshot;
use crate::subsystems::memory::Origin;

const PAGE_STYLE: &str = r#"
    *, *::before, *::after { box-sizing: border-box; }
    body {
      margin: 0; display: flex; min-height: 100vh;
      font-family: system-ui, -apple-system, sans-serif;
      background-color: #f0f0f0;
    }
    aside {
      width: 16rem; padding: 1.5rem 1rem;
      background: #e4e4e4; border-right: 1px solid #d0d0d0;
    }
    aside .status { margin-top: 1rem; font-size: 0.9rem; }
    main { flex: 1; padding: 1.5rem 2rem; display: flex; flex-direction: column; }
    .chat { display: flex; flex-direction: column; flex: 1; }
    .chat-bubble {
      border-radius: 10px; padding: 10px; margin: 5px;
      max-width: 70%; font-size: 16px; line-height: 1.4;
      white-space: pre-wrap;
    }
    .human-bubble { background-color: #808080; color: #97d700; }
    .ai-bubble { background-color: #97d700; color: #000000; }
    .row { display: flex; justify-content: flex-start; margin-bottom: 10px; }
    .row-reverse { display: flex; justify-content: flex-end; margin-bottom: 10px; }
    form.prompt { display: flex; gap: 0.5rem; margin-top: 2rem; }
    form.prompt input[type=text] { flex: 6; padding: 8px; font-size: 16px; }
    button {
      background-color: #97d700; color: #000000; border: none;
      padding: 8px 16px; font-size: 16px; margin: 4px 2px;
      cursor: pointer; border-radius: 12px;
    }
    button:hover { background-color: #45a049; }
"#;

// ── Form types ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct PageQuery {
    session: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct ChatForm {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    human_prompt: String,
}

#[derive(Deserialize)]
pub(super) struct ContextForm {
    #[serde(default)]
    session_id: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /: render the chat page for `?session=`, starting a session if needed.
pub(super) async fn root(State(state): State<AxumState>, Query(query): Query<PageQuery>) -> Html<String> {
    let snapshot = state.comms.open_session(query.session.as_deref()).await;
    Html(render_page(state.comms.bot_name(), &snapshot, None))
}

/// POST /chat: run one turn, then redirect back to the page.
pub(super) async fn chat(State(state): State<AxumState>, Form(form): Form<ChatForm>) -> Redirect {
    let reply = state.comms.send_message(Some(&form.session_id), &form.human_prompt).await;
    Redirect::to(&format!("/?session={}", reply.session_id))
}

/// POST /context: rebuild the index and show the outcome in the sidebar.
pub(super) async fn load_context(State(state): State<AxumState>, Form(form): Form<ContextForm>) -> Html<String> {
    let report = state.comms.rebuild_index().await;
    let snapshot = state.comms.open_session(Some(&form.session_id)).await;
    Html(render_page(state.comms.bot_name(), &snapshot, Some(report.status)))
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn render_page(bot_name: &str, session: &SessionSnapshot, status: Option<&str>) -> String {
    let title = escape_html(bot_name);
    let session_id = escape_html(&session.session_id);

    let mut bubbles = String::new();
    for msg in &session.history {
        let (row, bubble) = match msg.origin() {
            Origin::Ai => ("row", "ai-bubble"),
            Origin::Human => ("row-reverse", "human-bubble"),
        };
        bubbles.push_str(&format!(
            "      <div class=\"{row}\"><div class=\"chat-bubble {bubble}\">{}</div></div>\n",
            escape_html(msg.text())
        ));
    }

    let status_html = status
        .map(|s| format!("<p class=\"status\">{}</p>", escape_html(s)))
        .unwrap_or_default();

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title}</title>
  <style>{PAGE_STYLE}</style>
</head>
<body>
  <aside>
    <form method="post" action="/context">
      <input type="hidden" name="session_id" value="{session_id}" />
      <button type="submit">Load Context</button>
    </form>
    {status_html}
  </aside>
  <main>
    <h1>{title}</h1>
    <div class="chat">
{bubbles}    </div>
    <form class="prompt" method="post" action="/chat">
      <input type="hidden" name="session_id" value="{session_id}" />
      <input type="text" name="human_prompt" value="{pending}" placeholder="Ask Anything.." aria-label="Chat" autofocus autocomplete="off" />
      <button type="submit">Submit</button>
    </form>
  </main>
</body>
</html>
"#,
        pending = escape_html(&session.pending_input),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

// ── Tests ────────────────────────────────────────────────────────────────────
