//! Selector-driven extraction of contact fields from rendered HTML.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use prospector_core::error::AppError;
use prospector_core::models::{ExtractedFields, ExtractionOutcome};
use prospector_core::target::TargetConfig;
use prospector_core::traits::Extractor;
use regex::Regex;
use scraper::{Html, Selector};

use crate::strategy::{self, Context, Field, FieldChain, Strategy, regex, selector, visible_text};

/// Phone-like digit runs in free text.
pub const PHONE_PATTERN: &str = r"\+?\d[\d\-\s().]{6,}\d";
pub const EMAIL_PATTERN: &str = r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}";
/// Free-text phone matches with fewer digits are ignored.
pub const MIN_PHONE_DIGITS: usize = 7;
/// Characters of body text treated as the page snippet.
pub const SNIPPET_CHARS: usize = 1500;

const CONTAINER_SELECTORS: &[&str] = &[
    "#pane",
    r#"div[role="main"] div.widget-pane"#,
    r#"[data-section-id="pane"]"#,
    r#"div[aria-label^="Results for"]"#,
    r#"div[role="listitem"]"#,
    ".section-result",
    ".Nv2PK",
];

const NAME_SELECTORS: &[&str] = &[
    r#"h1[class*="fontHeadline"]"#,
    r#"h1[aria-level="1"]"#,
    "h1.section-hero-header-title-title",
    r#"[data-testid="title"]"#,
    r#"[role="heading"][aria-label]"#,
    "h1",
];

const ADDRESS_SELECTORS: &[&str] = &[
    r#"[data-item-id="address"]"#,
    ".LrzXr",
    ".Io6YTe",
    ".section-info-line",
    r#"button[data-tooltip="Copy address"]"#,
];

const CALL_SELECTORS: &[&str] = &[
    r#"a[href^="tel:"]"#,
    r#"[data-item-id^="phone"]"#,
    r#"button[data-tooltip*="Call"]"#,
    r#"button[aria-label*="call"]"#,
    r#"button[aria-label*="Phone"]"#,
    r#"button[jsaction*="phone"]"#,
    ".LrzXr.zdqRlf.kno-fv",
];

const WEBSITE_SELECTORS: &[&str] = &[
    r#"a[data-item-id="authority"]"#,
    r#"a[aria-label*="Website"]"#,
    r#"a[href*="http"][data-attrid]"#,
    r#"a[href^="http"]"#,
];

const DESCRIPTION_REGION: &str = ".QAXWLe, .section-editorial, .section-info-text";

/// Compiled selectors and chains. Built once, shared by every clone.
#[derive(Debug)]
struct Plan {
    containers: Vec<Selector>,
    chains: Vec<FieldChain>,
    body: Selector,
    phone_scan: Regex,
}

/// [`Extractor`] for search-result pages.
///
/// A snapshot is `NotReady` until one of the container signals is present;
/// after that every field is resolved through its own fallback chain and
/// missing fields stay `None`.
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    plan: Arc<Plan>,
    targets: Arc<TargetConfig>,
}

impl SelectorExtractor {
    /// Extractor with the built-in selector chains.
    pub fn new(targets: TargetConfig) -> Result<Self, AppError> {
        let compile = |list: &[&str]| list.iter().map(|s| selector(s)).collect::<Result<Vec<_>, _>>();

        let text = |list: &[&str]| -> Result<Vec<Strategy>, AppError> {
            Ok(compile(list)?.into_iter().map(Strategy::Text).collect())
        };

        let mut address = text(ADDRESS_SELECTORS)?;
        address.push(Strategy::AriaLabel {
            selector: selector(r#"button[aria-label*="Address"]"#)?,
            strip: regex(r"(?i)^\s*address:?")?,
        });

        let mut phone: Vec<Strategy> = compile(CALL_SELECTORS)?
            .into_iter()
            .map(Strategy::CallAffordance)
            .collect();
        phone.push(Strategy::Pattern {
            region: None,
            pattern: regex(PHONE_PATTERN)?,
            limit: None,
            min_digits: MIN_PHONE_DIGITS,
        });

        let website = compile(WEBSITE_SELECTORS)?
            .into_iter()
            .map(Strategy::ExternalHref)
            .collect();

        let description = selector(DESCRIPTION_REGION)?;
        let email = vec![
            Strategy::SchemeHref {
                selector: selector(r#"a[href^="mailto:" i]"#)?,
                scheme: "mailto:",
            },
            Strategy::Pattern {
                region: Some(description),
                pattern: regex(EMAIL_PATTERN)?,
                limit: None,
                min_digits: 0,
            },
            Strategy::Pattern {
                region: None,
                pattern: regex(EMAIL_PATTERN)?,
                limit: Some(SNIPPET_CHARS),
                min_digits: 0,
            },
        ];

        let chains = vec![
            FieldChain::new(Field::Name, text(NAME_SELECTORS)?),
            FieldChain::new(Field::Address, address),
            FieldChain::new(Field::Phone, phone),
            FieldChain::new(Field::Website, website),
            FieldChain::new(Field::Email, email),
        ];

        Self::with_chains(targets, compile(CONTAINER_SELECTORS)?, chains)
    }

    /// Extractor with caller-supplied readiness signals and field chains.
    pub fn with_chains(
        targets: TargetConfig,
        containers: Vec<Selector>,
        chains: Vec<FieldChain>,
    ) -> Result<Self, AppError> {
        let plan = Plan {
            containers,
            chains,
            body: selector("body")?,
            phone_scan: regex(PHONE_PATTERN)?,
        };
        Ok(Self {
            plan: Arc::new(plan),
            targets: Arc::new(targets),
        })
    }

    fn extract_fields(&self, snapshot: &str) -> ExtractionOutcome {
        let document = Html::parse_document(snapshot);

        let ready = self
            .plan
            .containers
            .iter()
            .any(|sel| document.select(sel).next().is_some());
        if !ready {
            return ExtractionOutcome::NotReady;
        }

        let body_text = document
            .select(&self.plan.body)
            .next()
            .map(visible_text)
            .unwrap_or_else(|| visible_text(document.root_element()));

        let ctx = Context {
            document: &document,
            body_text: &body_text,
            targets: &self.targets,
        };

        let mut fields = ExtractedFields::default();
        for chain in &self.plan.chains {
            let value = chain.resolve(&ctx);
            let slot = match chain.field {
                Field::Name => &mut fields.name,
                Field::Address => &mut fields.address,
                Field::Phone => &mut fields.phone,
                Field::Website => &mut fields.website,
                Field::Email => &mut fields.email,
            };
            *slot = value;
        }
        fields.phone2 = self.secondary_phone(&body_text);

        ExtractionOutcome::Ready(fields)
    }

    /// Second distinct phone-like match in the full body text.
    fn secondary_phone(&self, body_text: &str) -> Option<String> {
        let mut matches = self
            .plan
            .phone_scan
            .find_iter(body_text)
            .filter(|m| strategy::digit_count(m.as_str()) >= MIN_PHONE_DIGITS)
            .filter_map(|m| strategy::normalize(m.as_str()));
        let first = matches.next()?;
        matches.find(|m| *m != first)
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, snapshot: &str) -> ExtractionOutcome {
        if snapshot.trim().is_empty() {
            return ExtractionOutcome::NotReady;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.extract_fields(snapshot))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "extraction panicked".to_string());
                ExtractionOutcome::Error(detail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> SelectorExtractor {
        SelectorExtractor::new(TargetConfig::default()).unwrap()
    }

    fn ready(html: &str) -> ExtractedFields {
        match extractor().extract(html) {
            ExtractionOutcome::Ready(fields) => fields,
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn not_ready_without_container() {
        let html = "<html><body><h1>Acme</h1><p>Call 415-555-0100</p></body></html>";
        assert_eq!(extractor().extract(html), ExtractionOutcome::NotReady);
        assert_eq!(extractor().extract("   "), ExtractionOutcome::NotReady);
    }

    #[test]
    fn container_without_fields_is_ready_and_empty() {
        let fields = ready(r#"<body><div id="pane"></div></body>"#);
        assert_eq!(fields, ExtractedFields::default());
        assert!(!fields.has_identifying_field());
    }

    #[test]
    fn result_list_counts_as_container() {
        let fields = ready(r#"<body><div role="listitem"><h1>Acme</h1></div></body>"#);
        assert_eq!(fields.name.as_deref(), Some("Acme"));
    }

    #[test]
    fn free_text_phone_stops_at_last_digit() {
        let fields = ready(r#"<body><div id="pane"><p>+1 (415) 555-0100 call now</p></div></body>"#);
        assert_eq!(fields.phone.as_deref(), Some("+1 (415) 555-0100"));
    }

    #[test]
    fn short_digit_runs_are_not_phones() {
        let fields = ready(r#"<body><div id="pane"><p>Open 9 - 5 (Mon)</p></div></body>"#);
        assert_eq!(fields.phone, None);
    }

    #[test]
    fn structural_phone_beats_free_text() {
        let fields = ready(
            r#"<body><div id="pane">
                <p>Fax 415 555 0199</p>
                <a href="tel:+14155550100">Call</a>
            </div></body>"#,
        );
        assert_eq!(fields.phone.as_deref(), Some("+14155550100"));
    }

    #[test]
    fn external_website_wins_regardless_of_order() {
        let platform_first = ready(
            r#"<body><div id="pane">
                <a href="https://www.google.com/maps/place/acme">Map</a>
                <a href="https://acme.example/">Site</a>
            </div></body>"#,
        );
        let external_first = ready(
            r#"<body><div id="pane">
                <a href="https://acme.example/">Site</a>
                <a href="https://www.google.com/maps/place/acme">Map</a>
            </div></body>"#,
        );
        assert_eq!(platform_first.website.as_deref(), Some("https://acme.example/"));
        assert_eq!(external_first.website.as_deref(), Some("https://acme.example/"));
    }

    #[test]
    fn only_platform_links_leave_website_empty() {
        let fields = ready(
            r#"<body><div id="pane">
                <a href="https://www.google.com/search?q=acme">Search</a>
                <a href="https://maps.google.com/?cid=42">Map</a>
                <a href="/maps/dir/">Directions</a>
            </div></body>"#,
        );
        assert_eq!(fields.website, None);
    }

    #[test]
    fn authority_link_is_preferred() {
        let fields = ready(
            r#"<body><div id="pane">
                <a href="https://directory.example/acme">Listing</a>
                <a data-item-id="authority" href="https://acme.example/">acme.example</a>
            </div></body>"#,
        );
        assert_eq!(fields.website.as_deref(), Some("https://acme.example/"));
    }

    #[test]
    fn email_from_mailto_then_description() {
        let mailto = ready(
            r#"<body><div id="pane"><a href="mailto:Hello@Acme.example?subject=hi">Mail</a></div></body>"#,
        );
        assert_eq!(mailto.email.as_deref(), Some("Hello@Acme.example"));

        let described = ready(
            r#"<body><div id="pane"><div class="section-editorial">Write to sales@acme.example today</div></div></body>"#,
        );
        assert_eq!(described.email.as_deref(), Some("sales@acme.example"));
    }

    #[test]
    fn email_beyond_snippet_is_ignored() {
        let filler = "lorem ".repeat(400);
        let html = format!(
            r#"<body><div id="pane"><p>{filler}</p><p>late@acme.example</p></div></body>"#
        );
        assert_eq!(ready(&html).email, None);
    }

    #[test]
    fn secondary_phone_is_second_distinct_match() {
        let fields = ready(
            r#"<body><div id="pane">
                <p>Main 415-555-0100</p>
                <p>Again 415-555-0100</p>
                <p>Fax 415-555-0199</p>
            </div></body>"#,
        );
        assert_eq!(fields.phone.as_deref(), Some("415-555-0100"));
        assert_eq!(fields.phone2.as_deref(), Some("415-555-0199"));
    }

    #[test]
    fn address_from_aria_label() {
        let fields = ready(
            r#"<body><div id="pane"><button aria-label="Address: 1 Main St, Springfield"></button></div></body>"#,
        );
        assert_eq!(fields.address.as_deref(), Some("1 Main St, Springfield"));
    }

    #[test]
    fn clones_share_compiled_plan() {
        let a = extractor();
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.plan, &b.plan));
    }
}
