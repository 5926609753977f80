use marketplace_api::auth::account::{AccountStatus, NewAccount, Role};
use marketplace_api::auth::{AuthError, CredentialStore, PgCredentialStore};
use marketplace_api::test_support::{TestDatabase, TestDatabaseError};

fn new_account(email: &str, region_id: i32) -> NewAccount {
    NewAccount {
        first_name: "Alex".into(),
        last_name: "Qodirov".into(),
        email: email.into(),
        password_hash: "$argon2id$v=19$stub".into(),
        role: Role::User,
        status: AccountStatus::Pending,
        region_id,
        birth_year: 2001,
        picture: "alex.png".into(),
    }
}

#[tokio::test]
async fn postgres_store_enforces_unique_email_and_updates() {
    let test_db = match TestDatabase::new().await {
        Ok(db) => db,
        Err(TestDatabaseError::Container(err)) => {
            eprintln!("skipping postgres store test: container unavailable: {err}");
            return;
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    };

    let region_id: i32 = sqlx::query_scalar("INSERT INTO regions (name) VALUES ($1) RETURNING id")
        .bind("Tashkent")
        .fetch_one(test_db.pool())
        .await
        .expect("failed to insert region");

    let store = PgCredentialStore::new(test_db.pool_clone());

    assert_eq!(
        store
            .find_region(region_id)
            .await
            .expect("region lookup")
            .map(|region| region.name),
        Some("Tashkent".to_string())
    );
    assert!(store.find_region(region_id + 1).await.expect("lookup").is_none());

    let created = store
        .create(new_account("a@x.com", region_id))
        .await
        .expect("create");
    assert_eq!(created.role, Role::User);
    assert_eq!(created.status, AccountStatus::Pending);

    assert!(matches!(
        store.create(new_account("A@X.com", region_id)).await,
        Err(AuthError::DuplicateAccount)
    ));

    let found = store
        .find_by_email("A@x.com")
        .await
        .expect("lookup")
        .expect("found");
    assert_eq!(found.id, created.id);

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
        store.update_status("ghost@x.com", AccountStatus::Active).await,
        Err(AuthError::AccountNotFound)
    ));
    assert!(matches!(
        store.update_role(created.id + 100, Role::Admin).await,
        Err(AuthError::AccountNotFound)
    ));

    let accounts = store.list().await.expect("list");
    assert_eq!(accounts.len(), 1);
    assert_eq!(
        store.find_by_id(created.id).await.expect("lookup").map(|a| a.email),
        Some("a@x.com".to_string())
    );

    drop(store);
    test_db.close().await;
}
