use url::Url;

use crate::error::AppError;
use crate::models::WorkItem;

const DEFAULT_SEARCH_BASE: &str = "https://www.google.com/maps/search/?api=1";

/// Where queries are rendered and which links belong to the rendering platform.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Search endpoint; the query is appended as a URL parameter.
    pub search_base: Url,
    pub query_param: String,
    /// Hosts (and their subdomains) owned by the rendering platform.
    pub excluded_hosts: Vec<String>,
    /// Path fragments identifying the query surface itself.
    pub excluded_path_fragments: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            search_base: Url::parse(DEFAULT_SEARCH_BASE)
                .expect("default search base is a valid URL"),
            query_param: "query".to_string(),
            excluded_hosts: vec!["google.com".to_string()],
            excluded_path_fragments: vec!["/maps".to_string()],
        }
    }
}

impl TargetConfig {
    /// Point queries at a different search endpoint.
    pub fn with_search_base(mut self, base: &str) -> Result<Self, AppError> {
        self.search_base = Url::parse(base)
            .map_err(|e| AppError::ConfigError(format!("Invalid search base '{base}': {e}")))?;
        Ok(self)
    }

    pub fn with_excluded_host(mut self, host: impl Into<String>) -> Self {
        self.excluded_hosts.push(host.into());
        self
    }

    /// Build the navigation target for a work item.
    pub fn target_for(&self, item: &WorkItem) -> SearchTarget {
        let query = item.query();
        let mut url = self.search_base.clone();
        url.query_pairs_mut().append_pair(&self.query_param, &query);
        SearchTarget { query, url }
    }

    /// True when `href` points back at the rendering platform or the query surface.
    pub fn is_platform_link(&self, href: &str) -> bool {
        match Url::parse(href) {
            Ok(url) => {
                let host_excluded = url.host_str().is_some_and(|host| {
                    self.excluded_hosts
                        .iter()
                        .any(|h| host == h || host.ends_with(&format!(".{h}")))
                });
                let path_excluded = self
                    .excluded_path_fragments
                    .iter()
                    .any(|frag| url.path().contains(frag.as_str()));
                host_excluded || path_excluded
            }
            Err(_) => {
                self.excluded_hosts.iter().any(|h| href.contains(h.as_str()))
                    || self
                        .excluded_path_fragments
                        .iter()
                        .any(|frag| href.contains(frag.as_str()))
            }
        }
    }
}

/// A rendered-query navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    pub query: String,
    pub url: Url,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_encodes_query() {
        let config = TargetConfig::default();
        let item = WorkItem::new("0", "Café & Co", Some("Paris"), "FR");
        let target = config.target_for(&item);

        assert_eq!(target.query, "Café & Co, Paris, FR");
        assert_eq!(target.url.host_str(), Some("www.google.com"));
        let query = target
            .url
            .query_pairs()
            .find(|(k, _)| k == "query")
            .map(|(_, v)| v.into_owned());
        assert_eq!(query.as_deref(), Some("Café & Co, Paris, FR"));
        assert!(target.url.as_str().contains("api=1"));
    }

    #[test]
    fn platform_links_are_excluded() {
        let config = TargetConfig::default();
        assert!(config.is_platform_link("https://www.google.com/search?q=acme"));
        assert!(config.is_platform_link("https://maps.google.com/?cid=1"));
        assert!(config.is_platform_link("https://example.org/maps/place/acme"));
        assert!(!config.is_platform_link("https://acme.example"));
        assert!(!config.is_platform_link("https://notgoogle.company.example/about"));
    }

    #[test]
    fn unparsable_links_fall_back_to_substring_check() {
        let config = TargetConfig::default();
        assert!(config.is_platform_link("//google.com/thing"));
        assert!(!config.is_platform_link("acme.example"));
    }

    #[test]
    fn custom_search_base() {
        let config = TargetConfig::default()
            .with_search_base("http://127.0.0.1:9000/search")
            .unwrap();
        let target = config.target_for(&WorkItem::new("0", "Acme", None, "US"));
        assert_eq!(
            target.url.as_str(),
            "http://127.0.0.1:9000/search?query=Acme%2C+US"
        );

        assert!(TargetConfig::default().with_search_base("not a url").is_err());
    }
}
