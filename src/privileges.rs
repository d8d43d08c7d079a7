//! Role and privilege model.
//!
//! Every account carries an `account_type`. For all types except `CUSTOM` the
//! privilege set is a fixed lookup table; `CUSTOM` accounts store their own
//! set which can be edited through a dedicated endpoint. `ALL` acts as a
//! wildcard that grants every permission.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Named boolean capability gating a specific action.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    All,
    Admin,
    StatViewer,
    AccountCreator,
    MicroAccountCreator,
    ClientCreator,
    Nf,
    Finance,
    StockModifier,
    StorageModifier,
    Undo,
    Redo,
    DownStorage,
    Binding,
    PanelModifier,
}

pub const PERMISSIONS: [Permission; 15] = [
    Permission::All,
    Permission::Admin,
    Permission::StatViewer,
    Permission::AccountCreator,
    Permission::MicroAccountCreator,
    Permission::ClientCreator,
    Permission::Nf,
    Permission::Finance,
    Permission::StockModifier,
    Permission::StorageModifier,
    Permission::Undo,
    Permission::Redo,
    Permission::DownStorage,
    Permission::Binding,
    Permission::PanelModifier,
];

impl Permission {
    /// Parse the wire name of a permission, e.g. `"CLIENT_CREATOR"`.
    pub fn parse(value: &str) -> Option<Permission> {
        serde_json::from_value(serde_json::Value::String(value.to_owned())).ok()
    }
}

/// Enumerated account role determining default privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Owner,
    FullManagement,
    Caixa,
    Storage,
    Supervisor,
    Custom,
    // Self-registered accounts without any privileges.
    Basic,
    Client,
}

impl AccountType {
    pub fn parse(value: &str) -> ServiceResult<AccountType> {
        let value = value.trim().to_uppercase();
        match value.as_str() {
            "OWNER" => Ok(AccountType::Owner),
            "FULL_MANAGEMENT" => Ok(AccountType::FullManagement),
            "CAIXA" => Ok(AccountType::Caixa),
            "STORAGE" => Ok(AccountType::Storage),
            "SUPERVISOR" => Ok(AccountType::Supervisor),
            "CUSTOM" => Ok(AccountType::Custom),
            "BASIC" => Ok(AccountType::Basic),
            "CLIENT" => Ok(AccountType::Client),
            _ => Err(ServiceError::InvalidAccountType(value)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Owner => "OWNER",
            AccountType::FullManagement => "FULL_MANAGEMENT",
            AccountType::Caixa => "CAIXA",
            AccountType::Storage => "STORAGE",
            AccountType::Supervisor => "SUPERVISOR",
            AccountType::Custom => "CUSTOM",
            AccountType::Basic => "BASIC",
            AccountType::Client => "CLIENT",
        }
    }

    /// Account types that can be created through the account management
    /// endpoints. `BASIC` and `CLIENT` only exist via public registration.
    pub fn is_managed(&self) -> bool {
        !matches!(self, AccountType::Basic | AccountType::Client)
    }

    /// Account types allowed for public self-registration.
    pub fn is_public(&self) -> bool {
        matches!(self, AccountType::Basic | AccountType::Client)
    }
}

/// Mapping from permission name to boolean, serialized as a plain JSON
/// object (`{"CLIENT_CREATOR": true, ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PrivilegeSet(pub BTreeMap<Permission, bool>);

impl PrivilegeSet {
    /// Empty set, every permission unset (and therefore denied).
    pub fn empty() -> PrivilegeSet {
        PrivilegeSet(BTreeMap::new())
    }

    /// Complete set with every permission explicitly set to `granted`.
    pub fn complete(granted: bool) -> PrivilegeSet {
        PrivilegeSet(PERMISSIONS.iter().map(|p| (*p, granted)).collect())
    }

    fn from_pairs(pairs: &[(Permission, bool)]) -> PrivilegeSet {
        PrivilegeSet(pairs.iter().copied().collect())
    }

    /// Raw value of a single permission, unset keys default to false.
    pub fn get(&self, permission: Permission) -> bool {
        self.0.get(&permission).copied().unwrap_or(false)
    }

    pub fn set(&mut self, permission: Permission, granted: bool) {
        self.0.insert(permission, granted);
    }

    /// Effective check: the permission itself or the `ALL` wildcard.
    pub fn has(&self, permission: Permission) -> bool {
        self.get(permission) || self.get(Permission::All)
    }
}

impl AccountType {
    /// Fixed privilege table for non-custom account types.
    ///
    /// `CUSTOM`, `BASIC` and `CLIENT` have no defaults; their effective set
    /// comes from the stored per-account data (empty for the latter two).
    pub fn default_privileges(&self) -> PrivilegeSet {
        use Permission::*;
        match self {
            AccountType::Owner => PrivilegeSet::from_pairs(&[(All, true)]),
            AccountType::FullManagement => PrivilegeSet::from_pairs(&[
                (Admin, true),
                (StatViewer, false),
                (AccountCreator, false),
                (MicroAccountCreator, true),
                (ClientCreator, true),
                (Nf, true),
                (Finance, false),
                (StockModifier, true),
                (StorageModifier, true),
                (Undo, true),
                (Redo, true),
                (DownStorage, false),
                (Binding, false),
                (PanelModifier, false),
            ]),
            AccountType::Caixa => PrivilegeSet::from_pairs(&[
                (Admin, false),
                (StatViewer, false),
                (AccountCreator, false),
                (MicroAccountCreator, false),
                (ClientCreator, true),
                (Nf, true),
                (Finance, false),
                (StockModifier, false),
                (StorageModifier, false),
                (Undo, false),
                (Redo, false),
                (DownStorage, true),
                (Binding, true),
                (PanelModifier, false),
            ]),
            AccountType::Storage => PrivilegeSet::from_pairs(&[
                (Admin, false),
                (StatViewer, false),
                (AccountCreator, false),
                (MicroAccountCreator, false),
                (ClientCreator, false),
                (Nf, false),
                (Finance, false),
                (StockModifier, false),
                (StorageModifier, true),
                (Undo, true),
                (Redo, true),
                (DownStorage, true),
                (Binding, true),
                (PanelModifier, false),
            ]),
            AccountType::Supervisor => PrivilegeSet::from_pairs(&[
                (Admin, false),
                (StatViewer, false),
                (AccountCreator, false),
                (MicroAccountCreator, true),
                (ClientCreator, true),
                (Nf, false),
                (Finance, false),
                (StockModifier, false),
                (StorageModifier, false),
                (Undo, true),
                (Redo, true),
                (DownStorage, false),
                (Binding, false),
                (PanelModifier, false),
            ]),
            AccountType::Custom | AccountType::Basic | AccountType::Client => {
                PrivilegeSet::empty()
            }
        }
    }
}

/// Resolve the effective privilege set of an account.
///
/// Non-custom types always resolve to their fixed table, whatever is stored
/// for them. `CUSTOM` resolves to exactly the stored set with unset
/// permissions defaulting to false.
pub fn resolve_privileges(account_type: AccountType, stored: &PrivilegeSet) -> PrivilegeSet {
    match account_type {
        AccountType::Custom => {
            let mut resolved = PrivilegeSet::complete(false);
            for (permission, granted) in stored.0.iter() {
                resolved.set(*permission, *granted);
            }
            resolved
        }
        _ => account_type.default_privileges(),
    }
}

/// Allow/deny decision for a single required permission.
pub fn authorize(
    account_type: AccountType,
    stored: &PrivilegeSet,
    required: Permission,
) -> ServiceResult<()> {
    if resolve_privileges(account_type, stored).has(required) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "Access denied. Required privilege: '{}'",
            permission_name(required)
        )))
    }
}

fn permission_name(permission: Permission) -> String {
    match serde_json::to_value(permission) {
        Ok(serde_json::Value::String(name)) => name,
        _ => format!("{permission:?}"),
    }
}

/// Validate and normalize a privilege map for `CUSTOM` accounts.
///
/// Unknown keys are rejected and the result carries all permissions
/// explicitly. A raw `ALL` (or `ADMIN`) set to true expands to every
/// permission granted.
pub fn build_custom_privileges(input: &BTreeMap<String, bool>) -> ServiceResult<PrivilegeSet> {
    let mut result = PrivilegeSet::complete(false);

    for (key, granted) in input {
        let key = key.trim().to_uppercase();
        let permission = Permission::parse(&key)
            .ok_or_else(|| ServiceError::Validation(format!("Unknown privilege key: '{key}'")))?;
        result.set(permission, *granted);
    }

    if result.get(Permission::All) || result.get(Permission::Admin) {
        result = PrivilegeSet::complete(true);
    }

    Ok(result)
}
