//! Identity resolution
//!
//! Finds the existing customer a row belongs to with a fixed-priority
//! cascade: email, then mobile number, then tax ID, TIN and RC. The first
//! kind that yields an owner wins; later kinds are not consulted. Regulatory
//! identifiers are only looked up when the row actually carries some.

use crate::error::Result;
use crate::identifiers::ParsedIdentifiers;
use crate::models::IdentifierKind;

/// Read access to identifier ownership
pub trait IdentifierLookup {
    /// Customer owning any of `values` for `kind`, first hit in value order
    fn find_owner(&self, kind: IdentifierKind, values: &[String]) -> Result<Option<i64>>;
}

/// Cascade order
pub const RESOLUTION_ORDER: [IdentifierKind; 5] = [
    IdentifierKind::Email,
    IdentifierKind::Mobile,
    IdentifierKind::TaxId,
    IdentifierKind::Tin,
    IdentifierKind::Rc,
];

/// An existing customer matched through one identifier kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub customer_id: i64,
    pub kind: IdentifierKind,
}

/// Resolve a row to an existing customer, or `None` when a new one is needed
pub fn resolve<L: IdentifierLookup + ?Sized>(
    lookup: &L,
    identifiers: &ParsedIdentifiers,
) -> Result<Option<Match>> {
    for kind in RESOLUTION_ORDER {
        let values = identifiers.values(kind);
        if values.is_empty() {
            continue;
        }
        if let Some(customer_id) = lookup.find_owner(kind, values)? {
            return Ok(Some(Match { customer_id, kind }));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Map-backed lookup that records which kinds were queried
    #[derive(Default)]
    struct FakeLookup {
        owners: HashMap<(IdentifierKind, String), i64>,
        queried: RefCell<Vec<IdentifierKind>>,
    }

    impl FakeLookup {
        fn own(mut self, kind: IdentifierKind, value: &str, customer_id: i64) -> Self {
            self.owners.insert((kind, value.to_string()), customer_id);
            self
        }
    }

    impl IdentifierLookup for FakeLookup {
        fn find_owner(&self, kind: IdentifierKind, values: &[String]) -> Result<Option<i64>> {
            self.queried.borrow_mut().push(kind);
            Ok(values
                .iter()
                .find_map(|v| self.owners.get(&(kind, v.clone())).copied()))
        }
    }

    fn ids(emails: &[&str], mobiles: &[&str], tins: &[&str], rcs: &[&str]) -> ParsedIdentifiers {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        ParsedIdentifiers {
            emails: owned(emails),
            mobiles: owned(mobiles),
            tins: owned(tins),
            rcs: owned(rcs),
            ..Default::default()
        }
    }

    #[test]
    fn test_email_beats_mobile() {
        let lookup = FakeLookup::default()
            .own(IdentifierKind::Email, "a@x.com", 1)
            .own(IdentifierKind::Mobile, "0801", 2);
        let found = resolve(&lookup, &ids(&["a@x.com"], &["0801"], &[], &[])).unwrap();
        assert_eq!(
            found,
            Some(Match {
                customer_id: 1,
                kind: IdentifierKind::Email
            })
        );
        assert_eq!(*lookup.queried.borrow(), vec![IdentifierKind::Email]);
    }

    #[test]
    fn test_tin_beats_rc() {
        let lookup = FakeLookup::default()
            .own(IdentifierKind::Tin, "t-1", 3)
            .own(IdentifierKind::Rc, "rc-1", 4);
        let found = resolve(&lookup, &ids(&["new@x.com"], &["0999"], &["t-1"], &["rc-1"])).unwrap();
        assert_eq!(found.map(|m| m.customer_id), Some(3));
    }

    #[test]
    fn test_falls_through_to_rc() {
        let lookup = FakeLookup::default().own(IdentifierKind::Rc, "rc-1", 4);
        let found = resolve(&lookup, &ids(&[], &[], &["t-9"], &["rc-1"])).unwrap();
        assert_eq!(found.map(|m| m.kind), Some(IdentifierKind::Rc));
    }

    #[test]
    fn test_absent_kinds_are_not_queried() {
        let lookup = FakeLookup::default();
        let found = resolve(&lookup, &ids(&["a@x.com"], &[], &[], &[])).unwrap();
        assert_eq!(found, None);
        assert_eq!(*lookup.queried.borrow(), vec![IdentifierKind::Email]);
    }

    #[test]
    fn test_no_identifiers_means_new_customer() {
        let lookup = FakeLookup::default();
        assert_eq!(resolve(&lookup, &ParsedIdentifiers::default()).unwrap(), None);
        assert!(lookup.queried.borrow().is_empty());
    }
}
