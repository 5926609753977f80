use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use crate::auth::account::{Account, AccountStatus, NewAccount, Region, Role};
use crate::auth::{AuthError, AuthResult};

/// Persistence capability the account flows depend on.
///
/// `create` must enforce email uniqueness itself and report
/// [`AuthError::DuplicateAccount`] when it loses a race.
#[rocket::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>>;

    async fn find_by_id(&self, id: i64) -> AuthResult<Option<Account>>;

    async fn create(&self, account: NewAccount) -> AuthResult<Account>;

    async fn update_status(&self, email: &str, status: AccountStatus) -> AuthResult<()>;

    async fn update_role(&self, id: i64, role: Role) -> AuthResult<Account>;

    async fn find_region(&self, id: i32) -> AuthResult<Option<Region>>;

    async fn list(&self) -> AuthResult<Vec<Account>>;
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    regions: HashMap<i32, Region>,
    next_id: i64,
}

/// In-process store for tests and local runs without Postgres.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: RwLock<MemoryState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_regions(regions: impl IntoIterator<Item = Region>) -> Self {
        let store = Self::new();
        for region in regions {
            store.add_region(region);
        }
        store
    }

    pub fn add_region(&self, region: Region) {
        self.state.write().regions.insert(region.id, region);
    }
}

#[rocket::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        Ok(self.state.read().accounts.get(email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> AuthResult<Option<Account>> {
        Ok(self
            .state
            .read()
            .accounts
            .values()
            .find(|account| account.id == id)
            .cloned())
    }

    async fn create(&self, account: NewAccount) -> AuthResult<Account> {
        let mut state = self.state.write();
        if state.accounts.contains_key(&account.email) {
            return Err(AuthError::DuplicateAccount);
        }

        state.next_id += 1;
        let created = Account {
            id: state.next_id,
            first_name: account.first_name,
            last_name: account.last_name,
            email: account.email,
            password_hash: account.password_hash,
            role: account.role,
            status: account.status,
            region_id: account.region_id,
            birth_year: account.birth_year,
            picture: account.picture,
            created_at: Utc::now(),
        };
        state
            .accounts
            .insert(created.email.clone(), created.clone());
        Ok(created)
    }

    async fn update_status(&self, email: &str, status: AccountStatus) -> AuthResult<()> {
        let mut state = self.state.write();
        let account = state
            .accounts
            .get_mut(email)
            .ok_or(AuthError::AccountNotFound)?;
        account.status = status;
        Ok(())
    }

    async fn update_role(&self, id: i64, role: Role) -> AuthResult<Account> {
        let mut state = self.state.write();
        let account = state
            .accounts
            .values_mut()
            .find(|account| account.id == id)
            .ok_or(AuthError::AccountNotFound)?;
        account.role = role;
        Ok(account.clone())
    }

    async fn find_region(&self, id: i32) -> AuthResult<Option<Region>> {
        Ok(self.state.read().regions.get(&id).cloned())
    }

    async fn list(&self) -> AuthResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self.state.read().accounts.values().cloned().collect();
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            first_name: "Alex".into(),
            last_name: "Qodirov".into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::User,
            status: AccountStatus::Pending,
            region_id: 1,
            birth_year: 2000,
            picture: "alex.png".into(),
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_rejects_duplicates() {
        let store = MemoryCredentialStore::new();
        let first = store.create(new_account("a@x.com")).await.expect("create");
        let second = store.create(new_account("b@x.com")).await.expect("create");
        assert_eq!(first.id + 1, second.id);

        assert!(matches!(
            store.create(new_account("a@x.com")).await,
            Err(AuthError::DuplicateAccount)
        ));
        assert_eq!(store.list().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn updates_status_and_role() {
        let store = MemoryCredentialStore::new();
        let created = store.create(new_account("a@x.com")).await.expect("create");

        store
            .update_status("a@x.com", AccountStatus::Active)
            .await
            .expect("status");
        let promoted = store
            .update_role(created.id, Role::Admin)
            .await
            .expect("role");

        assert_eq!(promoted.status, AccountStatus::Active);
        assert_eq!(promoted.role, Role::Admin);
        assert!(matches!(
            store.update_role(999, Role::Admin).await,
            Err(AuthError::AccountNotFound)
        ));
    }

    #[tokio::test]
    async fn resolves_regions() {
        let store = MemoryCredentialStore::with_regions([Region {
            id: 7,
            name: "Tashkent".into(),
        }]);
        assert!(store.find_region(7).await.expect("lookup").is_some());
        assert!(store.find_region(8).await.expect("lookup").is_none());
    }
}
