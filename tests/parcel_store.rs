// Behaviour shared by every ParcelStore implementation.
//
// Each check is written once against the trait and run against both the
// SQLite store (file-backed, in a temp file) and the in-memory store.

use std::collections::HashMap;

use anyhow::Result;
use parcel_store::{
    initialize_schema, InMemoryParcelStore, Parcel, ParcelStatus, ParcelStore, SqliteConfig,
    SqliteParcelStore, StoreError,
};
use tempfile::NamedTempFile;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Helper function to create a store over a temporary file-based database
fn sqlite_store() -> Result<(SqliteParcelStore, NamedTempFile)> {
    init_tracing();
    let temp_file = NamedTempFile::new()?;
    let path = temp_file.path().to_string_lossy().into_owned();
    let conn = SqliteConfig::new(path).open()?;
    initialize_schema(&conn)?;
    Ok((SqliteParcelStore::from_connection(conn), temp_file))
}

fn test_parcel() -> Parcel {
    Parcel::new(1000, "test")
}

async fn add_get_delete(store: &impl ParcelStore) -> Result<()> {
    let parcel = test_parcel();

    let number = store.add(&parcel).await?;
    assert_ne!(number, 0);

    let stored = store.get(number).await?;
    assert_eq!(stored.number, number);
    assert_eq!(stored.client, parcel.client);
    assert_eq!(stored.status, parcel.status);
    assert_eq!(stored.address, parcel.address);
    assert_eq!(stored.created_at, parcel.created_at);

    store.delete(number).await?;

    let err = store.get(number).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { number: n } if n == number), "{err:?}");
    Ok(())
}

async fn numbers_are_fresh(store: &impl ParcelStore) -> Result<()> {
    let first = store.add(&test_parcel()).await?;
    let second = store.add(&test_parcel()).await?;
    assert_ne!(first, 0);
    assert_ne!(second, 0);
    assert_ne!(first, second);
    Ok(())
}

async fn set_address(store: &impl ParcelStore) -> Result<()> {
    let number = store.add(&test_parcel()).await?;

    store.set_address(number, "new test address").await?;

    let updated = store.get(number).await?;
    assert_eq!(updated.address, "new test address");
    assert_eq!(updated.status, ParcelStatus::Registered);
    Ok(())
}

async fn set_status(store: &impl ParcelStore) -> Result<()> {
    let number = store.add(&test_parcel()).await?;

    store.set_status(number, "sent").await?;
    assert_eq!(store.get(number).await?.status, ParcelStatus::Sent);

    // No transition graph: any known status may follow any other.
    store.set_status(number, "registered").await?;
    assert_eq!(store.get(number).await?.status, ParcelStatus::Registered);
    Ok(())
}

async fn invalid_status_is_rejected(store: &impl ParcelStore) -> Result<()> {
    let number = store.add(&test_parcel()).await?;

    for bogus in ["bogus", "Sent", "DELIVERED", ""] {
        let err = store.set_status(number, bogus).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)), "{err:?}");
    }
    assert_eq!(store.get(number).await?.status, ParcelStatus::Registered);

    // Validation happens before any lookup.
    let err = store.set_status(i64::MAX, "bogus").await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "{err:?}");
    Ok(())
}

async fn get_by_client(store: &impl ParcelStore) -> Result<()> {
    let client = 4_242_424;
    let mut expected = HashMap::new();
    for address in ["first", "second", "third"] {
        let mut parcel = Parcel::new(client, address);
        parcel.number = store.add(&parcel).await?;
        expected.insert(parcel.number, parcel);
    }
    store.add(&Parcel::new(client + 1, "elsewhere")).await?;
    store.add(&Parcel::new(7, "elsewhere")).await?;

    let stored = store.get_by_client(client).await?;
    assert_eq!(stored.len(), expected.len());
    for parcel in stored {
        let want = expected
            .get(&parcel.number)
            .unwrap_or_else(|| panic!("unexpected parcel {}", parcel.number));
        assert_eq!(&parcel, want);
    }
    Ok(())
}

async fn get_by_unknown_client_is_empty(store: &impl ParcelStore) -> Result<()> {
    store.add(&test_parcel()).await?;
    assert!(store.get_by_client(-1).await?.is_empty());
    Ok(())
}

async fn guarded_mutations_leave_row_unchanged(store: &impl ParcelStore) -> Result<()> {
    let number = store.add(&test_parcel()).await?;
    store.set_status(number, "sent").await?;

    let err = store.set_address(number, "changed").await.unwrap_err();
    assert!(
        matches!(
            err,
            StoreError::PreconditionFailed {
                status: ParcelStatus::Sent,
                ..
            }
        ),
        "{err:?}"
    );

    store.set_status(number, "delivered").await?;
    let err = store.delete(number).await.unwrap_err();
    assert!(
        matches!(
            err,
            StoreError::PreconditionFailed {
                status: ParcelStatus::Delivered,
                ..
            }
        ),
        "{err:?}"
    );

    let stored = store.get(number).await?;
    assert_eq!(stored.address, "test");
    assert_eq!(stored.status, ParcelStatus::Delivered);
    Ok(())
}

async fn mutations_on_missing_parcel(store: &impl ParcelStore) -> Result<()> {
    let missing = store.add(&test_parcel()).await? + 1000;

    let err = store.set_status(missing, "sent").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }), "{err:?}");

    let err = store.set_address(missing, "nowhere").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }), "{err:?}");

    let err = store.delete(missing).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }), "{err:?}");
    Ok(())
}

async fn delete_twice(store: &impl ParcelStore) -> Result<()> {
    let number = store.add(&test_parcel()).await?;
    store.delete(number).await?;
    let err = store.delete(number).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }), "{err:?}");
    Ok(())
}

macro_rules! store_tests {
    ($($check:ident),* $(,)?) => {
        mod sqlite {
            $(
                #[tokio::test]
                async fn $check() -> anyhow::Result<()> {
                    let (store, _db) = super::sqlite_store()?;
                    super::$check(&store).await
                }
            )*
        }

        mod in_memory {
            $(
                #[tokio::test]
                async fn $check() -> anyhow::Result<()> {
                    super::init_tracing();
                    let store = super::InMemoryParcelStore::new();
                    super::$check(&store).await
                }
            )*
        }
    };
}

store_tests!(
    add_get_delete,
    numbers_are_fresh,
    set_address,
    set_status,
    invalid_status_is_rejected,
    get_by_client,
    get_by_unknown_client_is_empty,
    guarded_mutations_leave_row_unchanged,
    mutations_on_missing_parcel,
    delete_twice,
);

#[tokio::test]
async fn store_works_behind_a_shared_trait_object() -> Result<()> {
    let (sqlite, _db) = sqlite_store()?;
    let stores: Vec<std::sync::Arc<dyn ParcelStore>> = vec![
        std::sync::Arc::new(sqlite),
        std::sync::Arc::new(InMemoryParcelStore::new()),
    ];
    for store in stores {
        let number = store.add(&test_parcel()).await?;
        assert_eq!(store.get(number).await?.client, 1000);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_address_updates_on_one_row() -> Result<()> {
    let (store, _db) = sqlite_store()?;
    let store = std::sync::Arc::new(store);
    let number = store.add(&test_parcel()).await?;

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = std::sync::Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.set_address(number, &format!("address {i}")).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let stored = store.get(number).await?;
    assert!(stored.address.starts_with("address "));
    Ok(())
}
