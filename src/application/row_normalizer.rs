//! Maps scraped header/value cells onto the canonical [`Record`] shape

use std::collections::HashSet;

use tracing::debug;

use crate::domain::{NO_LINK, RawRow, Record};

/// Normalize a scraped header so it matches the stored column name.
///
/// `" Order No. "` becomes `"order_no"`.
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(' ', "_")
        .replace('.', "")
}

/// Turn one raw row into a [`Record`]. Unknown columns are ignored and
/// missing ones stay empty.
pub fn normalize_row(row: &RawRow) -> Record {
    let mut record = Record::default();

    for (header, value) in &row.cells {
        let column = normalize_column_name(header);
        let value = value.trim().to_string();
        match column.as_str() {
            "office" => record.office = value,
            "order_type" => record.order_type = value,
            "order_no" => record.order_no = value,
            "order_date" => record.order_date = (!value.is_empty()).then_some(value),
            "name_of_party" => record.name_of_party = value,
            "ra_file_no" => record.ra_file_no = value,
            "category" => record.category = value,
            "iec" => record.iec = value,
            "issued_by" => record.issued_by = value,
            "text_of_order" => record.text_of_order = value,
            other => debug!("Ignoring unknown column '{}'", other),
        }
    }

    let link = row.link.trim();
    record.attachment_url = (!link.is_empty() && link != NO_LINK).then(|| link.to_string());
    record
}

/// Drop rows equal in every field to an earlier row, keeping first-seen order.
pub fn dedup_exact(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.clone()))
        .collect()
}

/// Normalize every row of a snapshot and remove exact duplicates.
pub fn normalize_snapshot(rows: &[RawRow]) -> Vec<Record> {
    let records: Vec<Record> = rows.iter().map(normalize_row).collect();
    let before = records.len();
    let deduped = dedup_exact(records);
    if deduped.len() != before {
        debug!("Removed {} exact duplicate rows", before - deduped.len());
    }
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(" Office ", "office")]
    #[case("Order No.", "order_no")]
    #[case("Name of Party", "name_of_party")]
    #[case("RA File No.", "ra_file_no")]
    #[case("IEC", "iec")]
    fn column_names_match_store(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_column_name(raw), expected);
    }

    fn raw(order_no: &str, link: &str) -> RawRow {
        RawRow {
            cells: vec![
                ("Office".into(), " Chennai ".into()),
                ("Order Type".into(), "Adjudication".into()),
                ("Order No.".into(), order_no.into()),
                ("Order Date".into(), "".into()),
                ("Remarks".into(), "ignored".into()),
            ],
            link: link.into(),
        }
    }

    #[test]
    fn row_maps_known_columns_and_drops_sentinel_link() {
        let record = normalize_row(&raw("12/2023", NO_LINK));
        assert_eq!(record.office, "Chennai");
        assert_eq!(record.order_type, "Adjudication");
        assert_eq!(record.order_no, "12/2023");
        assert_eq!(record.order_date, None);
        assert_eq!(record.attachment_url, None);
        assert!(record.name_of_party.is_empty());
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let rows = vec![
            raw("1", "https://x/a/1.pdf"),
            raw("2", "https://x/a/2.pdf"),
            raw("1", "https://x/a/1.pdf"),
            raw("3", NO_LINK),
        ];
        let records = normalize_snapshot(&rows);
        let order: Vec<&str> = records.iter().map(|r| r.order_no.as_str()).collect();
        assert_eq!(order, vec!["1", "2", "3"]);
    }

    #[test]
    fn same_key_different_content_is_not_an_exact_duplicate() {
        let mut second = raw("1", "https://x/a/1.pdf");
        second.cells[0].1 = "Mumbai".into();
        let records = normalize_snapshot(&[raw("1", "https://x/a/1.pdf"), second]);
        assert_eq!(records.len(), 2);
    }
}
