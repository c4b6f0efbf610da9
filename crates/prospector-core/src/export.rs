use std::io::Write;

use crate::error::AppError;
use crate::models::ResultRecord;

/// Write records as CSV with the fixed header
/// `Company, City, Country, Name, Phone, Website, Email, Address`.
///
/// The header is written even when `records` is empty.
pub fn write_records<W: Write>(writer: W, records: &[ResultRecord]) -> Result<(), AppError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    wtr.write_record(ResultRecord::HEADERS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::ingest::read_work_items;
    use crate::models::{ExtractedFields, WorkItem};

    #[test]
    fn header_order_is_fixed() {
        let mut out = Vec::new();
        write_records(&mut out, &[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Company,City,Country,Name,Phone,Website,Email,Address\n"
        );
    }

    #[test]
    fn quotes_fields_with_delimiters() {
        let item = WorkItem::new("0", "Acme, Inc", Some("Springfield"), "US");
        let fields = ExtractedFields {
            name: Some("Acme \"Best\" Inc".into()),
            address: Some("1 Main St, Springfield".into()),
            ..Default::default()
        };
        let mut out = Vec::new();
        write_records(&mut out, &[ResultRecord::merge(&item, &fields)]).unwrap();

        let text = String::from_utf8(out).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "\"Acme, Inc\",Springfield,US,\"Acme \"\"Best\"\" Inc\",,,,\"1 Main St, Springfield\""
        );
    }

    #[test]
    fn export_file_can_be_read_back_as_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let item = WorkItem::new("0", "Acme", Some("Springfield"), "US");
        let record = ResultRecord::failed(&item);

        write_records(fs::File::create(&path).unwrap(), &[record]).unwrap();
        let items = read_work_items(fs::File::open(&path).unwrap()).unwrap();

        assert_eq!(items, vec![item]);
    }
}
