//! Reading work items from a CSV file with a header row.

use std::io::Read;

use crate::error::AppError;
use crate::models::WorkItem;

/// Normalize a header cell: strip a UTF-8 BOM, trim, lower-case.
fn normalize_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Parse work items from CSV.
///
/// Requires `Company` and `Country` columns (matched case-insensitively);
/// `City` or `City/Town` is optional. Rows missing company or country are
/// skipped. Ids are the 0-based index among the kept rows.
pub fn read_work_items<R: Read>(reader: R) -> Result<Vec<WorkItem>, AppError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(normalize_header).collect();
    let column = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));

    let company_idx = column(&["company"])
        .ok_or_else(|| AppError::ConfigError("CSV must include a \"Company\" column".into()))?;
    let country_idx = column(&["country"])
        .ok_or_else(|| AppError::ConfigError("CSV must include a \"Country\" column".into()))?;
    let city_idx = column(&["city", "city/town"]);

    let mut items = Vec::new();
    let mut skipped = 0usize;
    for row in rdr.records() {
        let row = row?;
        let cell = |idx: usize| row.get(idx).unwrap_or("").trim();

        let company = cell(company_idx);
        let country = cell(country_idx);
        if company.is_empty() || country.is_empty() {
            skipped += 1;
            continue;
        }
        let city = city_idx.map(cell);
        items.push(WorkItem::new(items.len().to_string(), company, city, country));
    }

    if skipped > 0 {
        tracing::debug!(%skipped, "Skipped rows without company or country");
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_rows_with_normalized_headers() {
        let csv = "\u{feff} Company ,City/Town,COUNTRY\nAcme,Springfield,US\nGlobex,,DE\n";
        let items = read_work_items(csv.as_bytes()).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], WorkItem::new("0", "Acme", Some("Springfield"), "US"));
        assert_eq!(items[1].city, None);
        assert_eq!(items[1].id, "1");
    }

    #[test]
    fn skips_rows_without_company_or_country() {
        let csv = "company,country\n,US\nAcme,\nInitech,CA\n";
        let items = read_work_items(csv.as_bytes()).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].company, "Initech");
        assert_eq!(items[0].id, "0");
    }

    #[test]
    fn city_column_is_optional() {
        let csv = "Company,Country\nAcme,US\n";
        let items = read_work_items(csv.as_bytes()).unwrap();
        assert_eq!(items[0].query(), "Acme, US");
    }

    #[test]
    fn missing_required_columns_are_rejected() {
        let err = read_work_items("name,country\nAcme,US\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Company"));

        let err = read_work_items("company,city\nAcme,Paris\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Country"));
    }

    #[test]
    fn short_rows_are_tolerated() {
        let csv = "Company,Country,City\nAcme,US\n";
        let items = read_work_items(csv.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].city, None);
    }
}
