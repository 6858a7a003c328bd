//! Inline text transforms: `[[wiki links]]`, `==highlights==` and bare URLs.

use super::html_escape;
use crate::links::{relative_href, LinkResolver, PageRef, Resolution};
use crate::models::Page;
use pulldown_cmark::{CowStr, Event, LinkType, Tag, TagEnd};
use regex::Regex;
use std::sync::OnceLock;

static INLINE: OnceLock<Regex> = OnceLock::new();

fn inline_regex() -> &'static Regex {
    INLINE.get_or_init(|| {
        Regex::new(
            r#"\[\[([^\[\]]+)\]\]|==([^=\s](?:[^=\n]*[^=\s])?)==|(https?://[^\s<>\[\]()]*[^\s<>\[\]().,;:!?'"])"#,
        )
        .unwrap()
    })
}

/// Transformer for wiki-link syntax, resolved relative to the page being rendered
pub struct WikilinkTransformer<'a> {
    resolver: LinkResolver<'a>,
    from: &'a Page,
}

impl<'a> WikilinkTransformer<'a> {
    pub fn new(resolver: LinkResolver<'a>, from: &'a Page) -> Self {
        Self { resolver, from }
    }

    /// Rewrite text events outside code and existing links
    pub fn transform<'e>(&self, events: Vec<Event<'e>>) -> Vec<Event<'e>> {
        let mut result = Vec::with_capacity(events.len());
        let mut in_code_block = false;
        let mut link_depth = 0usize;
        let mut iter = events.into_iter().peekable();

        while let Some(event) = iter.next() {
            match event {
                Event::Text(text) if !in_code_block => {
                    // The parser splits `[[` and `]]` into separate text events
                    let mut merged = text.into_string();
                    while let Some(Event::Text(next)) =
                        iter.next_if(|e| matches!(e, Event::Text(_)))
                    {
                        merged.push_str(&next);
                    }

                    if link_depth > 0 {
                        result.push(Event::Text(CowStr::from(merged)));
                    } else {
                        self.process_text(&merged, &mut result);
                    }
                }
                other => {
                    match &other {
                        Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
                        Event::End(TagEnd::CodeBlock) => in_code_block = false,
                        Event::Start(Tag::Link { .. }) => link_depth += 1,
                        Event::End(TagEnd::Link) => link_depth = link_depth.saturating_sub(1),
                        _ => {}
                    }
                    result.push(other);
                }
            }
        }

        result
    }

    fn process_text<'e>(&self, text: &str, out: &mut Vec<Event<'e>>) {
        let mut last = 0;

        for caps in inline_regex().captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if whole.start() > last {
                out.push(text_event(&text[last..whole.start()]));
            }

            if let Some(inner) = caps.get(1) {
                match PageRef::parse(inner.as_str()) {
                    Some(page_ref) => self.push_page_ref(&page_ref, out),
                    None => out.push(text_event(whole.as_str())),
                }
            } else if let Some(marked) = caps.get(2) {
                out.push(Event::InlineHtml(CowStr::Borrowed("<mark>")));
                out.push(text_event(marked.as_str()));
                out.push(Event::InlineHtml(CowStr::Borrowed("</mark>")));
            } else {
                push_link(whole.as_str().to_string(), whole.as_str(), out);
            }

            last = whole.end();
        }

        if last < text.len() {
            out.push(text_event(&text[last..]));
        }
    }

    fn push_page_ref<'e>(&self, page_ref: &PageRef, out: &mut Vec<Event<'e>>) {
        match self.resolver.resolve(&page_ref.target) {
            Resolution::Public(target) => {
                push_link(relative_href(self.from, target), page_ref.text(), out);
            }
            Resolution::Private => out.push(span("non-public-link", page_ref.text())),
            Resolution::Unresolved => out.push(span("unresolved-link", page_ref.text())),
        }
    }
}

fn text_event<'e>(text: &str) -> Event<'e> {
    Event::Text(CowStr::from(text.to_string()))
}

fn span<'e>(class: &str, text: &str) -> Event<'e> {
    Event::InlineHtml(CowStr::from(format!(
        "<span class=\"{class}\">{}</span>",
        html_escape(text)
    )))
}

fn push_link<'e>(href: String, text: &str, out: &mut Vec<Event<'e>>) {
    out.push(Event::Start(Tag::Link {
        link_type: LinkType::Inline,
        dest_url: CowStr::from(href),
        title: CowStr::Borrowed(""),
        id: CowStr::Borrowed(""),
    }));
    out.push(text_event(text));
    out.push(Event::End(TagEnd::Link));
}
