//! Identifier parsing
//!
//! Turns raw sheet cells into normalised candidate identifiers. Every parser
//! is total: blank or malformed input yields an empty set, never an error.
//! Values are lower-cased and trimmed, and duplicates within one cell are
//! dropped while keeping first-seen order.

use serde::Serialize;

use crate::models::IdentifierKind;
use crate::sheet::{CellValue, InputRow};

/// Split a cell on commas into trimmed, lower-cased, non-empty tokens
fn tokens(value: Option<&CellValue>) -> impl Iterator<Item = String> {
    let text = value.map(CellValue::to_text).unwrap_or_default();
    text.to_lowercase()
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .into_iter()
}

fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

/// Email candidates: tokens containing `@`
pub fn parse_emails(value: Option<&CellValue>) -> Vec<String> {
    dedup(tokens(value).filter(|t| t.contains('@')))
}

/// Mobile number candidates: tokens that are all digits once a single
/// leading `+` is removed
pub fn parse_mobile_numbers(value: Option<&CellValue>) -> Vec<String> {
    dedup(tokens(value).filter(|t| is_phone_number(t)))
}

fn is_phone_number(token: &str) -> bool {
    let digits = token.strip_prefix('+').unwrap_or(token);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Generic text candidates (names, tax IDs, TINs, RCs)
pub fn parse_text_list(value: Option<&CellValue>) -> Vec<String> {
    dedup(tokens(value))
}

/// The address is kept whole: commas are part of it
pub fn parse_address(value: Option<&CellValue>) -> Option<String> {
    value
        .map(|v| v.to_text().trim().to_lowercase())
        .filter(|a| !a.is_empty())
}

/// Every candidate identifier extracted from one sheet row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedIdentifiers {
    pub emails: Vec<String>,
    pub mobiles: Vec<String>,
    pub names: Vec<String>,
    pub address: Option<String>,
    pub tax_ids: Vec<String>,
    pub tins: Vec<String>,
    pub rcs: Vec<String>,
}

impl ParsedIdentifiers {
    pub fn from_row(row: &InputRow) -> Self {
        Self {
            emails: parse_emails(row.email.as_ref()),
            mobiles: parse_mobile_numbers(row.mobile_no.as_ref()),
            names: parse_text_list(row.name.as_ref()),
            address: parse_address(row.address.as_ref()),
            tax_ids: parse_text_list(row.tax_id.as_ref()),
            tins: parse_text_list(row.tin.as_ref()),
            rcs: parse_text_list(row.rc.as_ref()),
        }
    }

    /// Candidates of one kind
    pub fn values(&self, kind: IdentifierKind) -> &[String] {
        match kind {
            IdentifierKind::Name => &self.names,
            IdentifierKind::Address => self.address.as_slice(),
            IdentifierKind::Mobile => &self.mobiles,
            IdentifierKind::Email => &self.emails,
            IdentifierKind::TaxId => &self.tax_ids,
            IdentifierKind::Tin => &self.tins,
            IdentifierKind::Rc => &self.rcs,
        }
    }

    pub fn is_empty(&self) -> bool {
        IdentifierKind::ALL.iter().all(|k| self.values(*k).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Option<CellValue> {
        CellValue::from_text(s)
    }

    #[test]
    fn test_parse_emails() {
        let cell = text(" Ada@Example.com, not-an-email ,bob@x.org,ada@example.com");
        assert_eq!(
            parse_emails(cell.as_ref()),
            vec!["ada@example.com", "bob@x.org"]
        );
        assert!(parse_emails(None).is_empty());
        assert!(parse_emails(text(" , ").as_ref()).is_empty());
    }

    #[test]
    fn test_parse_mobile_numbers() {
        let cell = text("+2348012345678, 0803 111 2222, 08031112222, ++123, +, abc");
        assert_eq!(
            parse_mobile_numbers(cell.as_ref()),
            vec!["+2348012345678", "08031112222"]
        );
    }

    #[test]
    fn test_parse_mobile_from_numeric_cell() {
        let cell = Some(CellValue::Float(8031112222.0));
        assert_eq!(parse_mobile_numbers(cell.as_ref()), vec!["8031112222"]);
    }

    #[test]
    fn test_parse_text_list() {
        let cell = text("Ada Lovelace, ADA LOVELACE,, A. Lovelace ");
        assert_eq!(
            parse_text_list(cell.as_ref()),
            vec!["ada lovelace", "a. lovelace"]
        );
        let numeric = Some(CellValue::Int(12345));
        assert_eq!(parse_text_list(numeric.as_ref()), vec!["12345"]);
    }

    #[test]
    fn test_parse_address_keeps_commas() {
        let cell = text("  12 Marina Road, Lagos  ");
        assert_eq!(
            parse_address(cell.as_ref()).as_deref(),
            Some("12 marina road, lagos")
        );
        assert_eq!(parse_address(None), None);
    }

    #[test]
    fn test_from_row() {
        let row = InputRow {
            email: text("a@x.com"),
            mobile_no: text("+1555"),
            name: text("Ann"),
            tin: text("TIN-1"),
            amount: text("10"),
            ..Default::default()
        };
        let ids = ParsedIdentifiers::from_row(&row);
        assert_eq!(ids.values(IdentifierKind::Email), ["a@x.com"]);
        assert_eq!(ids.values(IdentifierKind::Tin), ["tin-1"]);
        assert!(ids.values(IdentifierKind::Address).is_empty());
        assert!(!ids.is_empty());
        assert!(ParsedIdentifiers::default().is_empty());
    }
}
