//! Image rewriting: local images point at published copies under `assets/`.

use super::html_escape;
use crate::slug::sanitize_asset_name;
use percent_encoding::percent_decode_str;
use pulldown_cmark::{CowStr, Event, Tag, TagEnd};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

static IMG_TAG: OnceLock<Regex> = OnceLock::new();
static SRC_ATTR: OnceLock<Regex> = OnceLock::new();

fn img_tag() -> &'static Regex {
    IMG_TAG.get_or_init(|| Regex::new(r"(?i)<img\b[^>]*>").unwrap())
}

fn src_attr() -> &'static Regex {
    SRC_ATTR.get_or_init(|| {
        Regex::new(r#"(?i)(\bsrc\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).unwrap()
    })
}

pub struct ImageTransformer<'a> {
    /// Known asset file name -> source path
    assets: &'a BTreeMap<String, PathBuf>,
    /// Prefix from the rendered page back to the output root
    root_prefix: &'a str,
}

impl<'a> ImageTransformer<'a> {
    pub fn new(assets: &'a BTreeMap<String, PathBuf>, root_prefix: &'a str) -> Self {
        Self {
            assets,
            root_prefix,
        }
    }

    /// Rewrite image events. Every asset referenced is added to `used`
    /// as output path -> source path.
    pub fn transform<'e>(
        &self,
        events: Vec<Event<'e>>,
        used: &mut BTreeMap<String, PathBuf>,
    ) -> Vec<Event<'e>> {
        let mut result = Vec::with_capacity(events.len());
        let mut skip_depth = 0usize;

        for event in events {
            if skip_depth > 0 {
                match event {
                    Event::Start(Tag::Image { .. }) => skip_depth += 1,
                    Event::End(TagEnd::Image) => skip_depth -= 1,
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) if !is_remote(&dest_url) => {
                    let name = asset_name(&dest_url);
                    match self.publish(&name, used) {
                        Some(href) => {
                            result.push(Event::Start(Tag::Image {
                                link_type,
                                dest_url: CowStr::from(href),
                                title,
                                id,
                            }));
                        }
                        None => {
                            tracing::debug!("Image not found: {}", name);
                            result.push(Event::Text(CowStr::from(format!(
                                "[Image not found: {name}]"
                            ))));
                            skip_depth = 1;
                        }
                    }
                }
                Event::Html(raw) => result.push(Event::Html(self.rewrite_html(&raw, used))),
                Event::InlineHtml(raw) => {
                    result.push(Event::InlineHtml(self.rewrite_html(&raw, used)))
                }
                other => result.push(other),
            }
        }

        result
    }

    /// Record `name` as used and return its href, if it is a known asset
    fn publish(&self, name: &str, used: &mut BTreeMap<String, PathBuf>) -> Option<String> {
        let source = self.assets.get(name)?;
        let output = format!("assets/{}", sanitize_asset_name(name));
        let href = format!("{}{}", self.root_prefix, output);
        used.insert(output, source.clone());
        Some(href)
    }

    /// Point `src` of raw `<img>` tags at the published copy
    fn rewrite_html<'e>(
        &self,
        raw: &str,
        used: &mut BTreeMap<String, PathBuf>,
    ) -> CowStr<'e> {
        let rewritten = img_tag().replace_all(raw, |tag: &Captures| {
            let tag = &tag[0];
            let Some(src) = src_attr().captures(tag) else {
                return tag.to_string();
            };
            let (Some(attr), Some(value)) = (src.get(0), src.get(2).or_else(|| src.get(3)))
            else {
                return tag.to_string();
            };
            if is_remote(value.as_str()) {
                return tag.to_string();
            }

            let name = asset_name(value.as_str());
            match self.publish(&name, used) {
                Some(href) => format!(
                    "{}{}\"{}\"{}",
                    &tag[..attr.start()],
                    &src[1],
                    html_escape(&href),
                    &tag[attr.end()..]
                ),
                None => {
                    tracing::debug!("Image not found: {}", name);
                    html_escape(&format!("[Image not found: {name}]"))
                }
            }
        });
        CowStr::from(rewritten.into_owned())
    }
}

fn is_remote(dest: &str) -> bool {
    dest.contains("://") || dest.starts_with("data:") || dest.starts_with("//")
}

/// `../assets/My%20Map.png` -> `My Map.png`
fn asset_name(dest: &str) -> String {
    let decoded = percent_decode_str(dest).decode_utf8_lossy().replace('\\', "/");
    decoded
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulldown_cmark::{html, Parser};

    fn render(markdown: &str, prefix: &str) -> (String, BTreeMap<String, PathBuf>) {
        let assets = BTreeMap::from([(
            "Harbor Map.png".to_string(),
            PathBuf::from("/graph/assets/Harbor Map.png"),
        )]);
        let mut used = BTreeMap::new();
        let events = ImageTransformer::new(&assets, prefix)
            .transform(Parser::new(markdown).collect(), &mut used);
        let mut out = String::new();
        html::push_html(&mut out, events.into_iter());
        (out, used)
    }

    #[test]
    fn test_asset_name() {
        assert_eq!(asset_name("../assets/Harbor%20Map.png"), "Harbor Map.png");
        assert_eq!(asset_name("assets/map.png"), "map.png");
        assert_eq!(asset_name("map.png"), "map.png");
    }

    #[test]
    fn test_local_image_rewritten() {
        let (html, used) = render("![map](../assets/Harbor%20Map.png)", "../");
        assert!(html.contains(r#"<img src="../assets/Harbor_Map.png" alt="map" />"#));
        assert_eq!(
            used.get("assets/Harbor_Map.png"),
            Some(&PathBuf::from("/graph/assets/Harbor Map.png"))
        );
    }

    #[test]
    fn test_missing_image_placeholder() {
        let (html, used) = render("![lost](../assets/gone.png)", "");
        assert!(html.contains("[Image not found: gone.png]"));
        assert!(!html.contains("<img"));
        assert!(used.is_empty());
    }

    #[test]
    fn test_raw_img_tag_rewritten() {
        let (html, used) = render(
            r#"Look: <img src="../assets/Harbor%20Map.png" width="300"> and <img src='https://example.com/x.png'>"#,
            "../",
        );
        assert!(html.contains(r#"<img src="../assets/Harbor_Map.png" width="300">"#));
        assert!(html.contains("<img src='https://example.com/x.png'>"));
        assert!(used.contains_key("assets/Harbor_Map.png"));
    }

    #[test]
    fn test_raw_img_tag_missing_asset() {
        let (html, used) = render("<img src=\"../assets/gone.png\" />\n", "");
        assert!(html.contains("[Image not found: gone.png]"));
        assert!(!html.contains("<img"));
        assert!(used.is_empty());
    }

    #[test]
    fn test_remote_image_untouched() {
        let (html, used) = render("![x](https://example.com/x.png)", "../");
        assert!(html.contains(r#"src="https://example.com/x.png""#));
        assert!(used.is_empty());
    }
}
