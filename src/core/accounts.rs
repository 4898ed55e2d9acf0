//! In-memory accounts database for shared-secret client authentication.
//!
//! The bootstrap core only populates this with the single service
//! credential; the telemetry server consumes it read-mostly after handoff.

use std::collections::HashMap;
use std::fmt;

/// One named shared-secret credential.
#[derive(Clone)]
pub struct Account {
    /// Unique account name.
    pub name: String,
    secret: String,
    /// Whether clients authenticated under this account may write.
    pub writable: bool,
}

impl Account {
    /// The shared secret. Kept out of `Debug` output.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .field("writable", &self.writable)
            .finish()
    }
}

/// Name-keyed credential set. Keys are unique; `add` replaces.
#[derive(Debug, Default)]
pub struct AccountsDatabase {
    accounts: HashMap<String, Account>,
}

impl AccountsDatabase {
    /// Create an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential, replacing any previous entry with the same name.
    pub fn add(&mut self, name: &str, secret: &str, writable: bool) {
        self.accounts.insert(
            name.to_string(),
            Account {
                name: name.to_string(),
                secret: secret.to_string(),
                writable,
            },
        );
    }

    /// Look up a credential by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Account> {
        self.accounts.get(name)
    }

    /// Number of registered credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no credential is registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::AccountsDatabase;

    #[test]
    fn add_and_lookup() {
        let mut db = AccountsDatabase::new();
        assert!(db.is_empty());
        db.add("telemetry", "s3cret", false);
        assert_eq!(db.len(), 1);
        let account = db.get("telemetry").expect("account registered");
        assert_eq!(account.name, "telemetry");
        assert_eq!(account.secret(), "s3cret");
        assert!(!account.writable);
        assert!(db.get("other").is_none());
    }

    #[test]
    fn add_replaces_same_name() {
        let mut db = AccountsDatabase::new();
        db.add("telemetry", "old", false);
        db.add("telemetry", "new", true);
        assert_eq!(db.len(), 1);
        let account = db.get("telemetry").expect("account registered");
        assert_eq!(account.secret(), "new");
        assert!(account.writable);
    }

    #[test]
    fn debug_output_redacts_secret() {
        let mut db = AccountsDatabase::new();
        db.add("telemetry", "hunter2", false);
        let rendered = format!("{:?}", db.get("telemetry").expect("account"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("hunter2"));
    }
}
