use serde::{Deserialize, Serialize};

/// One business identifier to enrich.
///
/// `company` and `country` are guaranteed non-empty by the ingestion layer;
/// the orchestrator does not validate them again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub company: String,
    pub city: Option<String>,
    pub country: String,
}

impl WorkItem {
    pub fn new(
        id: impl Into<String>,
        company: impl Into<String>,
        city: Option<&str>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            company: company.into(),
            city: city.filter(|c| !c.trim().is_empty()).map(str::to_string),
            country: country.into(),
        }
    }

    /// Search query: company, city (when present) and country joined by `", "`.
    pub fn query(&self) -> String {
        let mut parts = vec![self.company.as_str()];
        if let Some(city) = self.city.as_deref() {
            parts.push(city);
        }
        parts.push(&self.country);
        parts.join(", ")
    }
}

/// Contact fields read from a rendered surface.
///
/// `None` means the field was not found; extraction never stores empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub phone2: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
}

impl ExtractedFields {
    /// True when at least one field that identifies a place holds non-blank text.
    pub fn has_identifying_field(&self) -> bool {
        [&self.name, &self.address, &self.phone, &self.website]
            .iter()
            .any(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

/// Result of one extraction attempt against a surface snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Ready(ExtractedFields),
    NotReady,
    Error(String),
}

/// Normalized output row, one per work item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultRecord {
    pub company: String,
    pub city: String,
    pub country: String,
    pub name: String,
    pub phone: String,
    pub website: String,
    pub email: String,
    pub address: String,
}

impl ResultRecord {
    /// Column order used by the export format.
    pub const HEADERS: [&'static str; 8] = [
        "Company", "City", "Country", "Name", "Phone", "Website", "Email", "Address",
    ];

    /// Record carrying only the work item's own columns.
    pub fn failed(item: &WorkItem) -> Self {
        Self {
            company: item.company.clone(),
            city: item.city.clone().unwrap_or_default(),
            country: item.country.clone(),
            ..Self::default()
        }
    }

    /// Merge a work item with the fields extracted for it.
    pub fn merge(item: &WorkItem, fields: &ExtractedFields) -> Self {
        let or_empty = |f: &Option<String>| f.clone().unwrap_or_default();
        Self {
            name: or_empty(&fields.name),
            phone: or_empty(&fields.phone),
            website: or_empty(&fields.website),
            email: or_empty(&fields.email),
            address: or_empty(&fields.address),
            ..Self::failed(item)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_with_city() {
        let item = WorkItem::new("0", "Acme", Some("Springfield"), "US");
        assert_eq!(item.query(), "Acme, Springfield, US");
    }

    #[test]
    fn test_query_without_city() {
        let item = WorkItem::new("1", "Acme", None, "US");
        assert_eq!(item.query(), "Acme, US");

        let blank_city = WorkItem::new("2", "Acme", Some("  "), "US");
        assert_eq!(blank_city.city, None);
        assert_eq!(blank_city.query(), "Acme, US");
    }

    #[test]
    fn test_merge_fills_missing_fields_with_empty() {
        let item = WorkItem::new("0", "Acme", Some("Springfield"), "US");
        let fields = ExtractedFields {
            name: Some("Acme Inc".into()),
            phone: Some("415-555-0100".into()),
            phone2: Some("415-555-0199".into()),
            ..Default::default()
        };
        let record = ResultRecord::merge(&item, &fields);
        assert_eq!(record.company, "Acme");
        assert_eq!(record.city, "Springfield");
        assert_eq!(record.name, "Acme Inc");
        assert_eq!(record.phone, "415-555-0100");
        assert_eq!(record.email, "");
        assert_eq!(record.address, "");
    }

    #[test]
    fn test_failed_record_keeps_only_item_columns() {
        let item = WorkItem::new("0", "Acme", None, "US");
        let record = ResultRecord::failed(&item);
        assert_eq!(record.company, "Acme");
        assert_eq!(record.city, "");
        assert_eq!(record.country, "US");
        assert_eq!(record.name, "");
        assert_eq!(record.website, "");
    }

    #[test]
    fn test_identifying_field() {
        assert!(!ExtractedFields::default().has_identifying_field());
        let email_only = ExtractedFields {
            email: Some("a@b.co".into()),
            phone2: Some("555 0100 22".into()),
            ..Default::default()
        };
        assert!(!email_only.has_identifying_field());
        let with_phone = ExtractedFields {
            phone: Some("555 0100 22".into()),
            ..Default::default()
        };
        assert!(with_phone.has_identifying_field());
    }

    #[test]
    fn test_blank_fields_are_not_identifying() {
        let blank = ExtractedFields {
            name: Some(String::new()),
            address: Some("   ".into()),
            website: Some("\t".into()),
            ..Default::default()
        };
        assert!(!blank.has_identifying_field());
    }
}
