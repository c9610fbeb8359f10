//! Domain models for banklink

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of identifier a customer can own
///
/// Each kind lives in its own child table. Contact and regulatory
/// identifiers are unique across all customers; names and addresses are only
/// unique per customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Name,
    Address,
    Mobile,
    Email,
    TaxId,
    Tin,
    Rc,
}

impl IdentifierKind {
    /// Every kind, in the order collections are written during an upsert
    pub const ALL: [IdentifierKind; 7] = [
        Self::Name,
        Self::Email,
        Self::Mobile,
        Self::Address,
        Self::TaxId,
        Self::Tin,
        Self::Rc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Address => "address",
            Self::Mobile => "mobile_no",
            Self::Email => "email",
            Self::TaxId => "tax_id",
            Self::Tin => "tin",
            Self::Rc => "rc",
        }
    }

    /// Child table holding values of this kind
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::Name => "customers_name",
            Self::Address => "customers_address",
            Self::Mobile => "customers_mobile_no",
            Self::Email => "customers_email",
            Self::TaxId => "customers_tax_id",
            Self::Tin => "customers_tin",
            Self::Rc => "customers_rc",
        }
    }

    /// Value column in the child table
    pub(crate) fn column(&self) -> &'static str {
        self.as_str()
    }

    /// Whether one value may belong to at most one customer
    pub fn is_globally_unique(&self) -> bool {
        !matches!(self, Self::Name | Self::Address)
    }
}

impl std::str::FromStr for IdentifierKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "address" => Ok(Self::Address),
            "mobile" | "mobile_no" => Ok(Self::Mobile),
            "email" => Ok(Self::Email),
            "tax_id" => Ok(Self::TaxId),
            "tin" => Ok(Self::Tin),
            "rc" => Ok(Self::Rc),
            _ => Err(format!("Unknown identifier kind: {}", s)),
        }
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved customer identity with every identifier attached to it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub names: Vec<String>,
    pub addresses: Vec<String>,
    pub mobiles: Vec<String>,
    pub emails: Vec<String>,
    pub tax_ids: Vec<String>,
    pub tins: Vec<String>,
    pub rcs: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Customer {
    /// Values of one identifier collection
    pub fn values(&self, kind: IdentifierKind) -> &[String] {
        match kind {
            IdentifierKind::Name => &self.names,
            IdentifierKind::Address => &self.addresses,
            IdentifierKind::Mobile => &self.mobiles,
            IdentifierKind::Email => &self.emails,
            IdentifierKind::TaxId => &self.tax_ids,
            IdentifierKind::Tin => &self.tins,
            IdentifierKind::Rc => &self.rcs,
        }
    }

    pub(crate) fn values_mut(&mut self, kind: IdentifierKind) -> &mut Vec<String> {
        match kind {
            IdentifierKind::Name => &mut self.names,
            IdentifierKind::Address => &mut self.addresses,
            IdentifierKind::Mobile => &mut self.mobiles,
            IdentifierKind::Email => &mut self.emails,
            IdentifierKind::TaxId => &mut self.tax_ids,
            IdentifierKind::Tin => &mut self.tins,
            IdentifierKind::Rc => &mut self.rcs,
        }
    }
}

/// Substring filters for listing customers
///
/// Every set field must match (case-insensitive, partial) at least one of the
/// customer's values of that kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerFilter {
    pub name: Option<String>,
    pub email: Option<String>,
    pub mobile_no: Option<String>,
    pub tax_id: Option<String>,
    pub tin: Option<String>,
    pub rc: Option<String>,
}

impl CustomerFilter {
    /// Non-empty filters paired with the identifier kind they search
    pub fn active(&self) -> Vec<(IdentifierKind, &str)> {
        [
            (IdentifierKind::Name, &self.name),
            (IdentifierKind::Email, &self.email),
            (IdentifierKind::Mobile, &self.mobile_no),
            (IdentifierKind::TaxId, &self.tax_id),
            (IdentifierKind::Tin, &self.tin),
            (IdentifierKind::Rc, &self.rc),
        ]
        .into_iter()
        .filter_map(|(kind, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (kind, v))
        })
        .collect()
    }
}

/// One page of customers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerList {
    pub customers: Vec<Customer>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

/// Per-bank totals of one customer's ledger rows for a year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub bank: String,
    pub total_trxns: i64,
    pub total_amount: f64,
}

/// Customer record together with its transaction summaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerWithSummary {
    pub customer: Customer,
    pub trxn_summary: Vec<TransactionSummary>,
}

/// Status of an ingestion job for one (year, bank) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed uploads receive no further updates from their run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown upload status: {}", s)),
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted upload row, unique on (year, bank)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub year: i32,
    pub bank: String,
    pub status: UploadStatus,
    pub progress: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// All uploads known to the tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadList {
    pub uploads: Vec<Upload>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}
