use std::collections::HashMap;

use async_trait::async_trait;
use futures::lock::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::parcel::{Parcel, ParcelStatus};
use crate::store::ParcelStore;

#[derive(Debug, Default)]
struct State {
    last_number: i64,
    parcels: HashMap<i64, Parcel>,
}

/// In-memory parcel store.
///
/// Intended for tests/dev. Applies the same rules and error kinds as the
/// SQLite store. Numbers start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct InMemoryParcelStore {
    state: Mutex<State>,
}

impl InMemoryParcelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.parcels.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl State {
    /// Returns the parcel only if it may still be edited.
    fn registered_mut(&mut self, number: i64) -> Result<&mut Parcel> {
        match self.parcels.get_mut(&number) {
            None => Err(StoreError::NotFound { number }),
            Some(parcel) if parcel.status != ParcelStatus::Registered => {
                Err(StoreError::PreconditionFailed {
                    number,
                    status: parcel.status,
                })
            }
            Some(parcel) => Ok(parcel),
        }
    }
}

#[async_trait]
impl ParcelStore for InMemoryParcelStore {
    async fn add(&self, parcel: &Parcel) -> Result<i64> {
        let mut state = self.state.lock().await;
        state.last_number += 1;
        let number = state.last_number;
        state.parcels.insert(
            number,
            Parcel {
                number,
                ..parcel.clone()
            },
        );
        debug!(number, client = parcel.client, "parcel added");
        Ok(number)
    }

    async fn get(&self, number: i64) -> Result<Parcel> {
        let state = self.state.lock().await;
        state
            .parcels
            .get(&number)
            .cloned()
            .ok_or(StoreError::NotFound { number })
    }

    async fn get_by_client(&self, client: i64) -> Result<Vec<Parcel>> {
        let state = self.state.lock().await;
        let parcels: Vec<Parcel> = state
            .parcels
            .values()
            .filter(|p| p.client == client)
            .cloned()
            .collect();
        Ok(parcels)
    }

    async fn set_status(&self, number: i64, status: &str) -> Result<()> {
        let status: ParcelStatus = status.parse().map_err(|err| {
            warn!(number, %err, "rejected status update");
            StoreError::Validation(err)
        })?;

        let mut state = self.state.lock().await;
        let parcel = state
            .parcels
            .get_mut(&number)
            .ok_or(StoreError::NotFound { number })?;
        parcel.status = status;
        Ok(())
    }

    async fn set_address(&self, number: i64, address: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let parcel = state.registered_mut(number)?;
        parcel.address = address.to_string();
        Ok(())
    }

    async fn delete(&self, number: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.registered_mut(number)?;
        state.parcels.remove(&number);
        Ok(())
    }
}
