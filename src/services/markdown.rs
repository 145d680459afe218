//! Markdown rendering for blog posts
//!
//! Posts are written in Markdown and rendered to HTML once, on save. Fenced
//! code blocks with a known language are highlighted by syntect with inline
//! styles, so pages need no extra stylesheet.
//!
//! ```
//! use barbershop::services::markdown::MarkdownRenderer;
//!
//! let html = MarkdownRenderer::new().render("# Уход за бородой\n\n**Масло** каждый день.");
//! assert!(html.contains("<h1>"));
//! assert!(html.contains("<strong>"));
//! ```

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

const DEFAULT_THEME: &str = "InspiredGitHub";

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

/// Markdown to HTML renderer. Cheap to clone.
#[derive(Clone)]
pub struct MarkdownRenderer {
    theme_name: String,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }

    /// Renderer using a syntect theme; unknown names fall back to the default
    pub fn with_theme(theme_name: &str) -> Self {
        let theme_name = if THEME_SET.themes.contains_key(theme_name) {
            theme_name.to_string()
        } else {
            DEFAULT_THEME.to_string()
        };

        Self { theme_name }
    }

    fn options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options
    }

    /// Render Markdown to HTML
    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, Self::options());
        let events = self.highlight_code_blocks(parser);

        let mut output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut output, events.into_iter());
        output
    }

    /// Replace code block events with pre-rendered HTML
    fn highlight_code_blocks<'a>(&self, parser: Parser<'a>) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut code: Option<(Option<String>, String)> = None;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(lang) if !lang.trim().is_empty() => {
                            lang.split_whitespace().next().map(str::to_string)
                        }
                        _ => None,
                    };
                    code = Some((lang, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, content)) = code.take() {
                        let html = match lang {
                            Some(lang) => self.highlight(&content, &lang),
                            None => format!("<pre><code>{}</code></pre>", escape_html(&content)),
                        };
                        events.push(Event::Html(html.into()));
                    }
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, content)) = code.as_mut() {
                        content.push_str(&text);
                    }
                }
                other => events.push(other),
            }
        }

        events
    }

    fn highlight(&self, code: &str, lang: &str) -> String {
        let syntax = SYNTAX_SET
            .find_syntax_by_token(lang)
            .or_else(|| SYNTAX_SET.find_syntax_by_extension(lang));
        let theme = THEME_SET.themes.get(&self.theme_name);

        if let (Some(syntax), Some(theme)) = (syntax, theme) {
            if let Ok(html) = highlighted_html_for_string(code, &*SYNTAX_SET, syntax, theme) {
                return html;
            }
        }

        format!(
            "<pre><code class=\"language-{}\">{}</code></pre>",
            escape_html(lang),
            escape_html(code)
        )
    }
}

/// Plain-text preview of a Markdown document, cut at a word boundary
pub fn excerpt(markdown: &str, max_chars: usize) -> String {
    let mut text = String::new();
    for event in Parser::new_ext(markdown, MarkdownRenderer::options()) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak
            | Event::HardBreak
            | Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => {
                if !text.ends_with(' ') && !text.is_empty() {
                    text.push(' ');
                }
            }
            _ => {}
        }
    }

    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars).collect();
    let cut = match cut.rfind(' ') {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}…", cut.trim_end())
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_theme_falls_back() {
        assert_eq!(MarkdownRenderer::with_theme("nope").theme_name, DEFAULT_THEME);
        assert_eq!(MarkdownRenderer::with_theme("base16-ocean.dark").theme_name, "base16-ocean.dark");
    }

    #[test]
    fn test_render_basic_markup() {
        let html = MarkdownRenderer::new().render("## Цены\n\n- *стрижка*\n- ~~бритьё~~\n\n[Запись](/barbershop/order_create/)");
        assert!(html.contains("<h2>Цены</h2>"));
        assert!(html.contains("<em>стрижка</em>"));
        assert!(html.contains("<del>бритьё</del>"));
        assert!(html.contains("href=\"/barbershop/order_create/\""));
    }

    #[test]
    fn test_render_table() {
        let html = MarkdownRenderer::new().render("| Услуга | Цена |\n|---|---|\n| Стрижка | 1500 |");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>Стрижка</td>"));
    }

    #[test]
    fn test_code_block_highlighting() {
        let renderer = MarkdownRenderer::new();

        let highlighted = renderer.render("```rust\nfn main() {}\n```");
        assert!(highlighted.contains("<pre style="));
        assert!(highlighted.contains("main"));

        let plain = renderer.render("```\n<b>raw</b>\n```");
        assert!(plain.contains("<pre><code>&lt;b&gt;raw&lt;/b&gt;"));

        let unknown = renderer.render("```no-such-lang\nx < y\n```");
        assert!(unknown.contains("class=\"language-no-such-lang\""));
        assert!(unknown.contains("x &lt; y"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(MarkdownRenderer::new().render(""), "");
    }

    #[test]
    fn test_excerpt() {
        let md = "# Заголовок\n\nПервый абзац текста.\n\nВторой абзац.";
        assert_eq!(excerpt(md, 200), "Заголовок Первый абзац текста. Второй абзац.");
        assert_eq!(excerpt(md, 20), "Заголовок Первый…");
        assert_eq!(excerpt("", 10), "");
    }
}
