//! Typed extraction strategies and the per-field fallback chains built from them.
//!
//! A chain is tried in declared order; the first strategy that yields a
//! non-empty value wins and later strategies are never consulted.

use std::sync::LazyLock;

use prospector_core::error::AppError;
use prospector_core::target::TargetConfig;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Tags whose text never counts as rendered content.
const HIDDEN_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

static CALL_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:call|phone)\b:?").expect("valid call-label regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Fields that have their own fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Address,
    Phone,
    Website,
    Email,
}

/// One way of reading a field from a parsed document.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Visible text of the first matching element with non-empty text.
    Text(Selector),
    /// `aria-label` of a matching element with `strip` removed.
    AriaLabel { selector: Selector, strip: Regex },
    /// A "call" control: `tel:` link, then its label, then its digits.
    CallAffordance(Selector),
    /// `href` of a matching anchor with the given URI scheme, scheme removed.
    SchemeHref {
        selector: Selector,
        scheme: &'static str,
    },
    /// Absolute http(s) link that does not point back at the rendering platform.
    ExternalHref(Selector),
    /// First regex match inside `region` (or the whole body), limited to the
    /// first `limit` characters when set, with at least `min_digits` digits.
    Pattern {
        region: Option<Selector>,
        pattern: Regex,
        limit: Option<usize>,
        min_digits: usize,
    },
}

/// Read-only context shared by all strategies for one snapshot.
pub struct Context<'a> {
    pub document: &'a Html,
    pub body_text: &'a str,
    pub targets: &'a TargetConfig,
}

impl Strategy {
    pub fn apply(&self, ctx: &Context<'_>) -> Option<String> {
        match self {
            Strategy::Text(selector) => ctx
                .document
                .select(selector)
                .find_map(|el| normalize(&visible_text(el))),
            Strategy::AriaLabel { selector, strip } => {
                ctx.document.select(selector).find_map(|el| {
                    el.value()
                        .attr("aria-label")
                        .and_then(|label| normalize(&strip.replace_all(label, "")))
                })
            }
            Strategy::CallAffordance(selector) => {
                ctx.document.select(selector).find_map(read_call_affordance)
            }
            Strategy::SchemeHref { selector, scheme } => {
                ctx.document.select(selector).find_map(|el| {
                    el.value()
                        .attr("href")
                        .and_then(|href| strip_scheme(href, scheme))
                        .map(|rest| rest.split('?').next().unwrap_or("").to_string())
                        .and_then(|v| normalize(&v))
                })
            }
            Strategy::ExternalHref(selector) => ctx.document.select(selector).find_map(|el| {
                let href = el.value().attr("href")?.trim();
                let url = Url::parse(href).ok()?;
                let is_web = matches!(url.scheme(), "http" | "https");
                (is_web && !ctx.targets.is_platform_link(href)).then(|| href.to_string())
            }),
            Strategy::Pattern {
                region,
                pattern,
                limit,
                min_digits,
            } => {
                let scan = |text: &str| {
                    let bounded = bound(text, *limit);
                    pattern
                        .find_iter(bounded)
                        .map(|m| m.as_str().trim())
                        .find(|m| digit_count(m) >= *min_digits)
                        .and_then(normalize)
                };
                match region {
                    Some(selector) => ctx
                        .document
                        .select(selector)
                        .find_map(|el| scan(&visible_text(el))),
                    None => scan(ctx.body_text),
                }
            }
        }
    }
}

/// Ordered strategies for one field.
#[derive(Debug, Clone)]
pub struct FieldChain {
    pub field: Field,
    pub strategies: Vec<Strategy>,
}

impl FieldChain {
    pub fn new(field: Field, strategies: Vec<Strategy>) -> Self {
        Self { field, strategies }
    }

    /// First non-empty value in priority order.
    pub fn resolve(&self, ctx: &Context<'_>) -> Option<String> {
        self.strategies.iter().find_map(|s| s.apply(ctx))
    }
}

fn read_call_affordance(el: ElementRef<'_>) -> Option<String> {
    if el.value().name() == "a" {
        if let Some(number) = el.value().attr("href").and_then(|h| strip_scheme(h, "tel:")) {
            let decoded = urlencoding::decode(number)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| number.to_string());
            if let Some(phone) = normalize(&decoded) {
                return Some(phone);
            }
        }
    }

    if let Some(label) = el.value().attr("aria-label") {
        let stripped = CALL_LABEL.replace_all(label, "");
        if digit_count(&stripped) > 0 {
            return normalize(&stripped);
        }
    }

    let text = visible_text(el);
    if digit_count(&text) > 0 {
        return normalize(&text);
    }
    None
}

/// Case-insensitive URI scheme strip, e.g. `TEL:+1...` -> `+1...`.
fn strip_scheme<'a>(href: &'a str, scheme: &str) -> Option<&'a str> {
    let href = href.trim();
    let prefix = href.get(..scheme.len())?;
    prefix
        .eq_ignore_ascii_case(scheme)
        .then(|| &href[scheme.len()..])
}

/// Rendered text of an element, text nodes joined by single spaces.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            matches!(a.value(), Node::Element(e) if HIDDEN_TAGS.contains(&e.name()))
        });
        let t = text.trim();
        if hidden || t.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(t);
    }
    out
}

/// Trim and collapse whitespace; `None` for empty results.
pub fn normalize(s: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(s.trim(), " ");
    (!collapsed.is_empty()).then(|| collapsed.into_owned())
}

pub fn digit_count(s: &str) -> usize {
    s.chars().filter(char::is_ascii_digit).count()
}

/// Prefix of `text` holding at most `limit` characters.
fn bound(text: &str, limit: Option<usize>) -> &str {
    match limit.and_then(|n| text.char_indices().nth(n)) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parse a CSS selector, reporting failures as configuration errors.
pub fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css)
        .map_err(|e| AppError::ConfigError(format!("Invalid selector '{css}': {e:?}")))
}

pub fn regex(pattern: &str) -> Result<Regex, AppError> {
    Regex::new(pattern)
        .map_err(|e| AppError::ConfigError(format!("Invalid pattern '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_for<'a>(doc: &'a Html, body: &'a str, targets: &'a TargetConfig) -> Context<'a> {
        Context {
            document: doc,
            body_text: body,
            targets,
        }
    }

    #[test]
    fn chain_prefers_declared_order_over_document_order() {
        let doc = Html::parse_document(
            r#"<body><h1>Results</h1><h1 class="DUwDvf fontHeadlineLarge">Acme Inc</h1></body>"#,
        );
        let targets = TargetConfig::default();
        let chain = FieldChain::new(
            Field::Name,
            vec![
                Strategy::Text(selector(r#"h1[class*="fontHeadline"]"#).unwrap()),
                Strategy::Text(selector("h1").unwrap()),
            ],
        );

        assert_eq!(
            chain.resolve(&ctx_for(&doc, "", &targets)).as_deref(),
            Some("Acme Inc")
        );
    }

    #[test]
    fn empty_candidates_fall_through() {
        let doc = Html::parse_document(r#"<body><h1>   </h1><div data-testid="title">Acme</div></body>"#);
        let targets = TargetConfig::default();
        let chain = FieldChain::new(
            Field::Name,
            vec![
                Strategy::Text(selector("h1").unwrap()),
                Strategy::Text(selector(r#"[data-testid="title"]"#).unwrap()),
            ],
        );
        assert_eq!(chain.resolve(&ctx_for(&doc, "", &targets)).as_deref(), Some("Acme"));
    }

    #[test]
    fn tel_link_is_decoded() {
        let doc = Html::parse_document(r#"<a href="TEL:%2B1%20415-555-0100">Call</a>"#);
        let targets = TargetConfig::default();
        let strategy = Strategy::CallAffordance(selector(r#"a[href]"#).unwrap());
        assert_eq!(
            strategy.apply(&ctx_for(&doc, "", &targets)).as_deref(),
            Some("+1 415-555-0100")
        );
    }

    #[test]
    fn call_button_label_is_stripped() {
        let doc = Html::parse_document(
            r#"<button data-tooltip="Call" aria-label="Call phone: 020 7946 0018"></button>"#,
        );
        let targets = TargetConfig::default();
        let strategy = Strategy::CallAffordance(selector("button").unwrap());
        assert_eq!(
            strategy.apply(&ctx_for(&doc, "", &targets)).as_deref(),
            Some("020 7946 0018")
        );
    }

    #[test]
    fn call_button_without_digits_yields_nothing() {
        let doc = Html::parse_document(r#"<button aria-label="Call">Call</button>"#);
        let targets = TargetConfig::default();
        let strategy = Strategy::CallAffordance(selector("button").unwrap());
        assert_eq!(strategy.apply(&ctx_for(&doc, "", &targets)), None);
    }

    #[test]
    fn pattern_respects_limit_and_digit_floor() {
        let doc = Html::parse_document("<body></body>");
        let targets = TargetConfig::default();
        let strategy = Strategy::Pattern {
            region: None,
            pattern: regex(r"\+?\d[\d\-\s().]{6,}\d").unwrap(),
            limit: Some(11),
            min_digits: 7,
        };
        assert_eq!(
            strategy.apply(&ctx_for(&doc, "(1) - (2) 555-0100", &targets)),
            None
        );
        assert_eq!(
            strategy
                .apply(&ctx_for(&doc, "555-010-0199 later", &targets))
                .as_deref(),
            Some("555-010-019")
        );
    }

    #[test]
    fn visible_text_skips_scripts() {
        let doc = Html::parse_document(
            "<body><p>Open  now</p><script>var phone = '555 555 5555';</script><p>daily</p></body>",
        );
        let body = doc.select(&selector("body").unwrap()).next().unwrap();
        assert_eq!(visible_text(body), "Open now daily");
    }

    #[test]
    fn bound_is_char_safe() {
        assert_eq!(bound("café au lait", Some(4)), "café");
        assert_eq!(bound("short", Some(40)), "short");
        assert_eq!(bound("short", None), "short");
    }

    #[test]
    fn invalid_selector_is_config_error() {
        assert!(matches!(selector("a[[").unwrap_err(), AppError::ConfigError(_)));
    }
}
