//! HTML parsing for the paginated orders table
//!
//! Splits the header row from body rows, reads every cell but the last as
//! text and reduces the last cell to its hyperlink (or [`NO_LINK`]).

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::domain::{NO_LINK, RawRow};
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

static DIGITS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d[\d,]*").ok());

/// CSS selectors locating the table and its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSelectors {
    pub table: String,
    pub row: String,
    pub header_cell: String,
    pub body_cell: String,
    pub link: String,
}

impl Default for TableSelectors {
    fn default() -> Self {
        Self {
            table: "table".to_string(),
            row: "tr".to_string(),
            header_cell: "th".to_string(),
            body_cell: "td".to_string(),
            link: "a[href]".to_string(),
        }
    }
}

/// Parser for one rendered page of the orders table
#[derive(Debug)]
pub struct TablePageParser {
    table_selector: String,
    table: Selector,
    row: Selector,
    header_cell: Selector,
    body_cell: Selector,
    link: Selector,
    base_url: Option<Url>,
}

impl TablePageParser {
    /// Compile selectors; relative links are resolved against `base_url` when given
    pub fn new(selectors: &TableSelectors, base_url: Option<&str>) -> ParsingResult<Self> {
        Ok(Self {
            table_selector: selectors.table.clone(),
            table: compile(&selectors.table)?,
            row: compile(&selectors.row)?,
            header_cell: compile(&selectors.header_cell)?,
            body_cell: compile(&selectors.body_cell)?,
            link: compile(&selectors.link)?,
            base_url: base_url.and_then(|url| Url::parse(url).ok()),
        })
    }

    /// Parse the body rows of one page, in document order
    pub fn parse_page(&self, markup: &str) -> ParsingResult<Vec<RawRow>> {
        let document = Html::parse_document(markup);
        let table = document
            .select(&self.table)
            .next()
            .ok_or_else(|| ParsingError::TableNotFound {
                selector: self.table_selector.clone(),
            })?;

        let mut rows = table.select(&self.row);
        let Some(header_row) = rows.next() else {
            warn!("Table has no rows at all");
            return Ok(Vec::new());
        };
        let headers: Vec<String> = header_row.select(&self.header_cell).map(cell_text).collect();

        let mut parsed = Vec::new();
        for row in rows {
            let cells: Vec<ElementRef<'_>> = row.select(&self.body_cell).collect();
            let Some((last, text_cells)) = cells.split_last() else {
                continue;
            };
            // "No data available" style placeholder spanning the whole table
            if text_cells.is_empty() && headers.len() > 1 {
                debug!("Skipping placeholder row");
                continue;
            }

            let values = text_cells.iter().copied().map(cell_text);
            let cells = headers.iter().cloned().zip(values).collect();
            let link = last
                .select(&self.link)
                .next()
                .and_then(|anchor| anchor.value().attr("href"))
                .map_or_else(|| NO_LINK.to_string(), |href| self.resolve(href));

            parsed.push(RawRow { cells, link });
        }

        debug!("Parsed {} rows under {} headers", parsed.len(), headers.len());
        Ok(parsed)
    }

    fn resolve(&self, href: &str) -> String {
        let href = href.trim();
        match &self.base_url {
            Some(base) => base
                .join(href)
                .map_or_else(|_| href.to_string(), |url| url.to_string()),
            None => href.to_string(),
        }
    }
}

/// Read the total page count from the pagination indicator.
///
/// Takes the last number in the indicator text, so both `"25"` and
/// `"Page 1 of 1,024"` work.
pub fn parse_page_count(markup: &str, selector: &str) -> ParsingResult<u32> {
    let compiled = compile(selector)?;
    let document = Html::parse_document(markup);
    let element = document
        .select(&compiled)
        .next()
        .ok_or_else(|| ParsingError::PageCountMissing {
            selector: selector.to_string(),
        })?;

    let text = cell_text(element);
    DIGITS
        .as_ref()
        .and_then(|digits| digits.find_iter(&text).last())
        .and_then(|m| m.as_str().replace(',', "").parse::<u32>().ok())
        .ok_or(ParsingError::PageCountUnparseable { text })
}

fn compile(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
}

fn cell_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <table id="metaTable">
          <thead>
            <tr><th> Office </th><th>Order Type</th><th>Order No.</th><th>Attachment</th></tr>
          </thead>
          <tbody>
            <tr><td>Chennai</td><td> Adjudication </td><td>12/2023</td>
                <td><a href="/CP/download/abc123/Order%20One.pdf">View</a></td></tr>
            <tr><td>Mumbai</td><td>Appeal</td><td>7/2024</td><td>-</td></tr>
          </tbody>
        </table>
        </body></html>
    "#;

    fn parser() -> TablePageParser {
        TablePageParser::new(&TableSelectors::default(), Some("https://portal.example.gov/CP/")).unwrap()
    }

    #[test]
    fn rows_keep_header_order_and_trailing_link() {
        let rows = parser().parse_page(PAGE).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(
            first.cells,
            vec![
                ("Office".to_string(), "Chennai".to_string()),
                ("Order Type".to_string(), "Adjudication".to_string()),
                ("Order No.".to_string(), "12/2023".to_string()),
            ]
        );
        assert_eq!(
            first.link,
            "https://portal.example.gov/CP/download/abc123/Order%20One.pdf"
        );
        assert_eq!(rows[1].link, NO_LINK);
    }

    #[test]
    fn missing_table_is_an_error() {
        let err = parser().parse_page("<html><body><p>logged out</p></body></html>").unwrap_err();
        assert!(matches!(err, ParsingError::TableNotFound { .. }));
    }

    #[test]
    fn placeholder_rows_are_skipped() {
        let markup = r#"<table><tr><th>A</th><th>B</th></tr>
            <tr><td colspan="2">No data available in table</td></tr></table>"#;
        assert!(parser().parse_page(markup).unwrap().is_empty());
    }

    #[test]
    fn page_count_takes_last_number() {
        assert!(DIGITS.is_some());
        let markup = r#"<div class="pages"><span id="last">Page 1 of 1,024</span></div>"#;
        assert_eq!(parse_page_count(markup, "#last").unwrap(), 1024);
        assert_eq!(parse_page_count("<b id='n'> 25 </b>", "#n").unwrap(), 25);
    }

    #[test]
    fn page_count_errors_are_distinct() {
        assert!(matches!(
            parse_page_count("<p></p>", "#last"),
            Err(ParsingError::PageCountMissing { .. })
        ));
        assert!(matches!(
            parse_page_count("<b id='n'>none</b>", "#n"),
            Err(ParsingError::PageCountUnparseable { .. })
        ));
    }
}
