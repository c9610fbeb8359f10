//! Customer identity operations

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::identifiers::ParsedIdentifiers;
use crate::models::{Customer, CustomerFilter, CustomerList, IdentifierKind};
use crate::resolver::IdentifierLookup;

/// Largest page `list_customers` will return
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Result of merging one row's identifiers into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// The definitive customer for the row
    pub customer_id: i64,
    /// A new customer was allocated for this row
    pub created: bool,
    /// Identifier rows actually written (ignored duplicates excluded)
    pub identifiers_added: usize,
}

/// Escape LIKE wildcards so filters match literally
fn like_pattern(value: &str) -> String {
    let escaped = value
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Load one customer and every identifier collection, in insertion order
fn load_customer(conn: &Connection, id: i64) -> Result<Option<Customer>> {
    let timestamps: Option<(String, String)> = conn
        .query_row(
            "SELECT created_at, updated_at FROM customers WHERE id = ?",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((created_at, updated_at)) = timestamps else {
        return Ok(None);
    };

    let mut customer = Customer {
        id,
        created_at: Some(parse_datetime(&created_at)),
        updated_at: Some(parse_datetime(&updated_at)),
        ..Default::default()
    };

    for kind in IdentifierKind::ALL {
        let sql = format!(
            "SELECT {col} FROM {table} WHERE customer_id = ? ORDER BY id",
            col = kind.column(),
            table = kind.table()
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let values = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        *customer.values_mut(kind) = values;
    }

    Ok(Some(customer))
}

impl Database {
    /// Find the customer owning any of `values` for one identifier kind
    ///
    /// Values are checked in order and the first hit wins. Matching is exact;
    /// callers pass values already normalised by the identifier parser.
    pub fn find_customer_id(&self, kind: IdentifierKind, values: &[String]) -> Result<Option<i64>> {
        if values.is_empty() {
            return Ok(None);
        }

        let conn = self.conn()?;
        let sql = format!(
            "SELECT customer_id FROM {table} WHERE {col} = ? ORDER BY id LIMIT 1",
            table = kind.table(),
            col = kind.column()
        );
        let mut stmt = conn.prepare_cached(&sql)?;

        for value in values {
            let found: Option<i64> = stmt.query_row(params![value], |row| row.get(0)).optional()?;
            if found.is_some() {
                return Ok(found);
            }
        }

        Ok(None)
    }

    /// Attach a row's identifiers to a customer, creating the customer when
    /// `customer_id` is `None`
    ///
    /// Runs as one transaction. Existing `(value, customer)` pairs are skipped,
    /// and so are values already owned by a different customer: an identifier
    /// row is never reassigned once written.
    pub fn upsert_customer(
        &self,
        customer_id: Option<i64>,
        identifiers: &ParsedIdentifiers,
    ) -> Result<UpsertOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let (customer_id, created) = match customer_id {
            Some(id) => (id, false),
            None => {
                tx.execute("INSERT INTO customers DEFAULT VALUES", [])?;
                (tx.last_insert_rowid(), true)
            }
        };

        let mut identifiers_added = 0;
        for kind in IdentifierKind::ALL {
            let values = identifiers.values(kind);
            if values.is_empty() {
                continue;
            }

            let sql = format!(
                "INSERT OR IGNORE INTO {table} ({col}, customer_id) VALUES (?, ?)",
                table = kind.table(),
                col = kind.column()
            );
            let mut stmt = tx.prepare_cached(&sql)?;
            for value in values {
                identifiers_added += stmt.execute(params![value, customer_id])?;
            }
        }

        if identifiers_added > 0 && !created {
            tx.execute(
                "UPDATE customers SET updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                params![customer_id],
            )?;
        }

        tx.commit()?;

        debug!(
            customer_id,
            created, identifiers_added, "Customer identifiers upserted"
        );

        Ok(UpsertOutcome {
            customer_id,
            created,
            identifiers_added,
        })
    }

    /// Get a customer with all of its identifiers
    pub fn get_customer(&self, id: i64) -> Result<Option<Customer>> {
        let conn = self.conn()?;
        load_customer(&conn, id)
    }

    /// List customers matching every active filter, ordered by id
    ///
    /// A customer with several matching identifier rows appears once, and
    /// `total` counts distinct customers before paging.
    pub fn list_customers(
        &self,
        filter: &CustomerFilter,
        offset: i64,
        limit: i64,
    ) -> Result<CustomerList> {
        let offset = offset.max(0);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);

        let mut conditions = Vec::new();
        let mut query_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        for (kind, value) in filter.active() {
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM {table} i WHERE i.customer_id = c.id AND i.{col} LIKE ? ESCAPE '\\')",
                table = kind.table(),
                col = kind.column()
            ));
            query_params.push(Box::new(like_pattern(value)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let conn = self.conn()?;

        let count_sql = format!("SELECT COUNT(*) FROM customers c {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            query_params.iter().map(|p| p.as_ref()).collect();
        let total: i64 = conn.query_row(&count_sql, param_refs.as_slice(), |row| row.get(0))?;

        let page_sql = format!(
            "SELECT c.id FROM customers c {} ORDER BY c.id LIMIT ? OFFSET ?",
            where_clause
        );
        query_params.push(Box::new(limit));
        query_params.push(Box::new(offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            query_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&page_sql)?;
        let ids = stmt
            .query_map(param_refs.as_slice(), |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut customers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(customer) = load_customer(&conn, id)? {
                customers.push(customer);
            }
        }

        Ok(CustomerList {
            customers,
            total,
            offset,
            limit,
        })
    }

    /// Delete a customer and, by cascade, all of its identifiers
    pub fn delete_customer(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM customers WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Count all customers
    pub fn count_customers(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Count identifier rows of one kind (across all customers)
    pub fn count_identifiers(&self, kind: IdentifierKind) -> Result<i64> {
        let conn = self.conn()?;
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let count = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

impl IdentifierLookup for Database {
    fn find_owner(&self, kind: IdentifierKind, values: &[String]) -> Result<Option<i64>> {
        self.find_customer_id(kind, values)
    }
}
