use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::privileges::{AccountType, PrivilegeSet};

/// User account with login credentials and permission data.
///
/// `privileges` is the *stored* set; the effective set is resolved through
/// `privileges::resolve_privileges` and only honors stored data for
/// `CUSTOM` accounts.
#[derive(Debug, PartialEq, Clone)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub account_type: AccountType,
    pub privileges: PrivilegeSet,
    /// Free-form, account-type specific data (e.g. the register number of a
    /// CAIXA account). Validated by the account handlers.
    pub profile: serde_json::Value,
}

/// Customer record with per-category percentage discounts.
#[derive(Debug, PartialEq, Clone)]
pub struct Client {
    pub id: i64,
    pub cpf: String,
    pub name: String,
    pub nickname: Option<String>,
    /// category (lower-case) -> discount percentage
    pub discounts: BTreeMap<String, f64>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

/// Catalog entry. Quantities live in the `stock_items` relation; the
/// aggregated quantity is attached where the API needs it.
#[derive(Debug, PartialEq, Clone)]
pub struct Product {
    pub id: i64,
    pub item: String,
    pub brand: Option<String>,
    pub purchase_value: Option<f64>,
    pub sale_value: f64,
    pub expiration_date: Option<NaiveDate>,
    pub details: Option<serde_json::Value>,
    pub category: Option<String>,
    pub supplier_id: Option<i64>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub cnpj: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

/// A storage location holding quantities of products.
#[derive(Debug, PartialEq, Clone)]
pub struct Stock {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// One recorded sale (a receipt). The id is generated by the cashier
/// client (UUID) so offline registers can sync later.
#[derive(Debug, PartialEq, Clone)]
pub struct Sell {
    pub id: String,
    pub cashier_id: String,
    pub operator: String,
    pub sell_time: DateTime<Utc>,
    pub total_value: f64,
    pub payment_method: String,
    pub received_value: Option<f64>,
    pub change: Option<f64>,
    pub client_id: Option<i64>,
    pub items: Vec<SoldItem>,
}

/// A single receipt line. Product name and unit value are copied at sale
/// time so later catalog edits do not rewrite history.
#[derive(Debug, PartialEq, Clone)]
pub struct SoldItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_value: f64,
    pub total_value: f64,
}
