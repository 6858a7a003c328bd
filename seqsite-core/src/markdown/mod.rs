//! Block rendering: outline blocks to HTML with link resolution and assets.

pub mod images;
pub mod wikilinks;

use crate::config::Config;
use crate::links::{code_span_regex, LinkResolver, Resolution};
use crate::models::{Block, Page, Properties, SiteIndex, TaskMarker};
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

pub use images::ImageTransformer;
pub use wikilinks::WikilinkTransformer;

static EMBED_BLOCK: OnceLock<Regex> = OnceLock::new();
static LABELLED_REF: OnceLock<Regex> = OnceLock::new();
static INLINE_EMBED: OnceLock<Regex> = OnceLock::new();
static MACRO: OnceLock<Regex> = OnceLock::new();
static ATTRIBUTES: OnceLock<Regex> = OnceLock::new();

fn embed_block() -> &'static Regex {
    EMBED_BLOCK
        .get_or_init(|| Regex::new(r"^\{\{embed\s+\[\[([^\[\]]+)\]\]\s*\}\}$").unwrap())
}

/// A rendered property, value already converted to HTML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedProperty {
    pub key: String,
    pub value_html: String,
}

/// Output of rendering one page
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    /// Visible page properties
    pub properties: Vec<RenderedProperty>,
    /// Block tree HTML
    pub content: String,
    /// Referenced assets: output path -> source path
    pub assets: BTreeMap<String, PathBuf>,
}

#[derive(Default)]
struct RenderState {
    assets: BTreeMap<String, PathBuf>,
    /// Pages currently being embedded, outermost first
    embeds: Vec<PathBuf>,
}

/// Renders pages of a built site. Rendering is a pure function of the
/// site index and configuration.
pub struct PageRenderer<'a> {
    site: &'a SiteIndex,
    config: &'a Config,
    options: Options,
}

impl<'a> PageRenderer<'a> {
    pub fn new(site: &'a SiteIndex, config: &'a Config) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);

        Self {
            site,
            config,
            options,
        }
    }

    fn resolver(&self) -> LinkResolver<'a> {
        LinkResolver::new(&self.site.pages, &self.site.lookup)
    }

    pub fn render_page(&self, page: &Page) -> RenderedPage {
        let mut state = RenderState {
            embeds: vec![page.source_path.clone()],
            ..Default::default()
        };

        let properties = self.render_properties(page, &page.properties, &mut state);

        let mut content = String::new();
        for block in &page.blocks {
            self.render_block(page, block, &mut state, &mut content);
        }

        RenderedPage {
            properties,
            content,
            assets: state.assets,
        }
    }

    fn render_properties(
        &self,
        from: &Page,
        properties: &Properties,
        state: &mut RenderState,
    ) -> Vec<RenderedProperty> {
        properties
            .iter()
            .filter(|p| !self.config.is_hidden_property(&p.key) && !p.value.trim().is_empty())
            .map(|p| RenderedProperty {
                key: p.key.clone(),
                value_html: self.inline_html(from, &p.value, state),
            })
            .collect()
    }

    fn render_block(&self, from: &Page, block: &Block, state: &mut RenderState, out: &mut String) {
        out.push_str("<div class=\"block\">");

        let embedded = embed_block()
            .captures(block.text.trim())
            .and_then(|caps| self.embed_target(&caps[1], state));

        match embedded {
            Some(target) => self.render_embed(from, target, state, out),
            None => match block.heading {
                Some(level) => {
                    out.push_str(&format!("<h{level}>"));
                    if let Some(marker) = block.marker {
                        out.push_str(&marker_span(marker));
                        out.push(' ');
                    }
                    out.push_str(&self.inline_html(from, &block.text, state));
                    out.push_str(&format!("</h{level}>"));
                }
                None => out.push_str(&self.markdown_html(from, &block.text, block.marker, state)),
            },
        }

        let properties = self.render_properties(from, &block.properties, state);
        if !properties.is_empty() {
            out.push_str("<dl class=\"block-properties\">");
            for prop in properties {
                out.push_str(&format!(
                    "<dt>{}</dt><dd>{}</dd>",
                    html_escape(&prop.key),
                    prop.value_html
                ));
            }
            out.push_str("</dl>");
        }

        if !block.children.is_empty() {
            out.push_str("<ul>");
            for child in &block.children {
                out.push_str("<li>");
                self.render_block(from, child, state, out);
                out.push_str("</li>");
            }
            out.push_str("</ul>");
        }

        out.push_str("</div>\n");
    }

    /// Public page to embed, unless it would recurse
    fn embed_target(&self, target: &str, state: &RenderState) -> Option<&'a Page> {
        match self.resolver().resolve(target) {
            Resolution::Public(page) if !state.embeds.contains(&page.source_path) => Some(page),
            _ => None,
        }
    }

    fn render_embed(&self, from: &Page, target: &Page, state: &mut RenderState, out: &mut String) {
        state.embeds.push(target.source_path.clone());
        out.push_str("<div class=\"embed\">");
        for block in &target.blocks {
            self.render_block(from, block, state, out);
        }
        out.push_str("</div>");
        state.embeds.pop();
    }

    fn markdown_html(
        &self,
        from: &Page,
        text: &str,
        marker: Option<TaskMarker>,
        state: &mut RenderState,
    ) -> String {
        let prepared = preprocess(text);
        // Every newline inside a block is a visible line break
        let events: Vec<Event> = Parser::new_ext(&prepared, self.options)
            .map(|event| match event {
                Event::SoftBreak => Event::HardBreak,
                other => other,
            })
            .collect();

        let root_prefix = from.root_prefix();
        let events =
            ImageTransformer::new(&self.site.assets, &root_prefix).transform(events, &mut state.assets);
        let mut events = WikilinkTransformer::new(self.resolver(), from).transform(events);

        if let Some(marker) = marker {
            let span = Event::InlineHtml(CowStr::from(format!("{} ", marker_span(marker))));
            match events
                .iter()
                .position(|e| matches!(e, Event::Start(Tag::Paragraph)))
            {
                Some(idx) => events.insert(idx + 1, span),
                None => {
                    events.insert(0, Event::Html(CowStr::from(format!("<p>{}</p>", marker_span(marker)))))
                }
            }
        }

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());
        html_output
    }

    fn inline_html(&self, from: &Page, text: &str, state: &mut RenderState) -> String {
        let html = self.markdown_html(from, text, None, state);
        let trimmed = html.trim_end();
        match trimmed
            .strip_prefix("<p>")
            .and_then(|rest| rest.strip_suffix("</p>"))
        {
            Some(inner) if !inner.contains("<p>") => inner.to_string(),
            _ => trimmed.to_string(),
        }
    }
}

/// Rewrite Logseq-only syntax into plain markdown plus `[[...]]` refs
fn preprocess(text: &str) -> String {
    let labelled = LABELLED_REF
        .get_or_init(|| Regex::new(r"\[([^\[\]]+)\]\(\[\[([^\[\]]+)\]\]\)").unwrap());
    let inline_embed = INLINE_EMBED
        .get_or_init(|| Regex::new(r"\{\{embed\s+(\[\[[^\[\]]+\]\])\s*\}\}").unwrap());
    let macro_call = MACRO.get_or_init(|| Regex::new(r"\{\{[^}]*\}\}").unwrap());
    let attributes = ATTRIBUTES.get_or_init(|| Regex::new(r"\{:[^}]*\}").unwrap());

    map_outside_code(text, |segment| {
        let segment = labelled.replace_all(segment, "[[$2|$1]]");
        let segment = segment.replace("#[[", "[[");
        let segment = inline_embed.replace_all(&segment, "$1");
        let segment = macro_call.replace_all(&segment, "");
        attributes.replace_all(&segment, "").into_owned()
    })
}

fn map_outside_code(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for code in code_span_regex().find_iter(text) {
        out.push_str(&f(&text[last..code.start()]));
        out.push_str(code.as_str());
        last = code.end();
    }
    out.push_str(&f(&text[last..]));
    out
}

fn marker_span(marker: TaskMarker) -> String {
    format!(
        "<span class=\"task-marker task-{}\">{}</span>",
        marker.as_str(),
        marker.glyph()
    )
}

pub(crate) fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::{LinkGraph, PageLookup};
    use crate::models::Visibility;
    use crate::outline::OutlineParser;

    fn page(title: &str, output: &str, visibility: Visibility, content: &str) -> Page {
        let outline = OutlineParser::default().parse(content);
        Page {
            source_path: PathBuf::from(format!("pages/{title}.md")),
            output_path: output.to_string(),
            title: title.to_string(),
            aliases: vec![],
            properties: outline.properties,
            visibility,
            journal_date: None,
            blocks: outline.blocks,
        }
    }

    fn site(pages: Vec<Page>) -> SiteIndex {
        let (lookup, diagnostics) = PageLookup::build(&pages);
        let graph = LinkGraph::build(&pages, &lookup);
        SiteIndex {
            pages,
            lookup,
            graph,
            assets: BTreeMap::from([(
                "map.png".to_string(),
                PathBuf::from("/graph/assets/map.png"),
            )]),
            diagnostics,
        }
    }

    fn campaign_site() -> SiteIndex {
        site(vec![
            page(
                "Campaign Notes",
                "pages/campaign-notes.html",
                Visibility::Public,
                "public:: true\nsetting:: [[Harbor]]\n\n- Met [[Secret NPC]]\n\t- At [the docks]([[Harbor]])\n- DONE Find the ![map](../assets/map.png)\n",
            ),
            page(
                "Harbor",
                "pages/harbor.html",
                Visibility::Public,
                "- ## Harbor\n- {{embed [[Campaign Notes]]}}\n",
            ),
            page(
                "Secret NPC",
                "pages/secret-npc.html",
                Visibility::Private,
                "- The villain in disguise\n",
            ),
        ])
    }

    #[test]
    fn test_preprocess() {
        assert_eq!(preprocess("[the docks]([[Harbor]])"), "[[Harbor|the docks]]");
        assert_eq!(preprocess("#[[npc]] {{query todo}}"), "[[npc]] ");
        assert_eq!(preprocess("see {{embed [[A]]}} too"), "see [[A]] too");
        assert_eq!(preprocess("`#[[code]]`"), "`#[[code]]`");
        assert_eq!(preprocess("![m](m.png){:height 200}"), "![m](m.png)");
    }

    #[test]
    fn test_nested_blocks_become_nested_lists() {
        let site = campaign_site();
        let config = Config::default();
        let rendered = PageRenderer::new(&site, &config).render_page(&site.pages[0]);

        assert!(rendered.content.starts_with("<div class=\"block\"><p>Met "));
        assert!(rendered
            .content
            .contains("<ul><li><div class=\"block\"><p>At <a href=\"../pages/harbor.html\">the docks</a></p>"));
    }

    #[test]
    fn test_private_link_never_leaks() {
        let site = campaign_site();
        let config = Config::default();
        let rendered = PageRenderer::new(&site, &config).render_page(&site.pages[0]);

        assert!(rendered
            .content
            .contains("<span class=\"non-public-link\">Secret NPC</span>"));
        assert!(!rendered.content.contains("secret-npc"));
        assert!(!rendered.content.contains("villain"));
    }

    #[test]
    fn test_properties_and_assets() {
        let site = campaign_site();
        let config = Config::default();
        let rendered = PageRenderer::new(&site, &config).render_page(&site.pages[0]);

        assert_eq!(
            rendered.properties,
            vec![RenderedProperty {
                key: "setting".into(),
                value_html: "<a href=\"../pages/harbor.html\">Harbor</a>".into(),
            }]
        );
        assert!(rendered.content.contains("<p><span class=\"task-marker task-done\">"));
        assert!(rendered
            .content
            .contains("</span> Find the <img src=\"../assets/map.png\" alt=\"map\" />"));
        assert_eq!(
            rendered.assets.get("assets/map.png"),
            Some(&PathBuf::from("/graph/assets/map.png"))
        );
    }

    #[test]
    fn test_heading_and_embed() {
        let site = campaign_site();
        let config = Config::default();
        let rendered = PageRenderer::new(&site, &config).render_page(&site.pages[1]);

        assert!(rendered.content.contains("<h2>Harbor</h2>"));
        assert!(rendered.content.contains("<div class=\"embed\"><div class=\"block\"><p>Met "));
        assert!(rendered.content.contains("<span class=\"non-public-link\">Secret NPC</span>"));
    }

    #[test]
    fn test_embed_cycle_renders_link() {
        let site = site(vec![
            page("A", "a.html", Visibility::Public, "- {{embed [[B]]}}\n"),
            page("B", "b.html", Visibility::Public, "- {{embed [[A]]}}\n"),
        ]);
        let config = Config::default();
        let rendered = PageRenderer::new(&site, &config).render_page(&site.pages[0]);

        assert_eq!(rendered.content.matches("<div class=\"embed\">").count(), 1);
        assert!(rendered.content.contains("<a href=\"a.html\">A</a>"));
    }

    #[test]
    fn test_embed_of_private_page_is_not_expanded() {
        let site = site(vec![
            page("Open", "open.html", Visibility::Public, "- {{embed [[Hidden]]}}\n"),
            page("Hidden", "hidden.html", Visibility::Private, "- Do not show\n"),
        ]);
        let config = Config::default();
        let rendered = PageRenderer::new(&site, &config).render_page(&site.pages[0]);

        assert!(!rendered.content.contains("Do not show"));
        assert!(rendered
            .content
            .contains("<span class=\"non-public-link\">Hidden</span>"));
    }

    #[test]
    fn test_block_properties_visible_keys_only() {
        let site = site(vec![page(
            "Npc",
            "npc.html",
            Visibility::Public,
            "- Captain Vos\n  id:: 64f1c2d3-0000-4000-8000-000000000000\n  role:: smuggler\n",
        )]);
        let config = Config::default();
        let rendered = PageRenderer::new(&site, &config).render_page(&site.pages[0]);

        assert!(rendered
            .content
            .contains("<dl class=\"block-properties\"><dt>role</dt><dd>smuggler</dd></dl>"));
        assert!(!rendered.content.contains("64f1c2d3"));
    }

    #[test]
    fn test_property_value_renders_without_paragraph() {
        let site = site(vec![
            page(
                "Vos",
                "pages/vos.html",
                Visibility::Public,
                "public:: true\nrole:: **smuggler** of [[Harbor]]\n\n- Captain\n",
            ),
            page("Harbor", "pages/harbor.html", Visibility::Public, "- Ships\n"),
        ]);
        let config = Config::default();
        let rendered = PageRenderer::new(&site, &config).render_page(&site.pages[0]);

        assert_eq!(rendered.properties.len(), 1);
        assert_eq!(
            rendered.properties[0].value_html,
            "<strong>smuggler</strong> of <a href=\"../pages/harbor.html\">Harbor</a>"
        );
    }

    #[test]
    fn test_multiline_block_keeps_line_breaks() {
        let site = site(vec![page(
            "Song",
            "pages/song.html",
            Visibility::Public,
            "- First line\n  second line\n",
        )]);
        let config = Config::default();
        let rendered = PageRenderer::new(&site, &config).render_page(&site.pages[0]);

        assert!(rendered
            .content
            .contains("<p>First line<br />\nsecond line</p>"));
    }

    #[test]
    fn test_footnotes() {
        let site = site(vec![page(
            "Lore",
            "pages/lore.html",
            Visibility::Public,
            "- The tower fell[^1].\n\n  [^1]: In the third age.\n",
        )]);
        let config = Config::default();
        let rendered = PageRenderer::new(&site, &config).render_page(&site.pages[0]);

        assert!(rendered.content.contains("class=\"footnote-reference\""));
        assert!(rendered.content.contains("class=\"footnote-definition\""));
        assert!(rendered.content.contains("In the third age."));
    }
}
