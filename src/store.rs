use async_trait::async_trait;

use crate::error::Result;
use crate::parcel::Parcel;

/// Parcel repository.
///
/// Implementations must apply the same rules: statuses are validated before
/// any I/O, address changes and deletion only touch `registered` parcels, and
/// a mutation that matches no row is reported as an error rather than success.
#[async_trait]
pub trait ParcelStore: Send + Sync {
    /// Stores `parcel` (its `number` is ignored) and returns the assigned number.
    async fn add(&self, parcel: &Parcel) -> Result<i64>;

    async fn get(&self, number: i64) -> Result<Parcel>;

    /// All parcels of `client`, in no particular order.
    async fn get_by_client(&self, client: i64) -> Result<Vec<Parcel>>;

    /// Sets the status unconditionally. `status` must be one of the persisted
    /// status names.
    async fn set_status(&self, number: i64, status: &str) -> Result<()>;

    async fn set_address(&self, number: i64, address: &str) -> Result<()>;

    async fn delete(&self, number: i64) -> Result<()>;
}

#[async_trait]
impl<T> ParcelStore for std::sync::Arc<T>
where
    T: ParcelStore + ?Sized,
{
    async fn add(&self, parcel: &Parcel) -> Result<i64> {
        (**self).add(parcel).await
    }

    async fn get(&self, number: i64) -> Result<Parcel> {
        (**self).get(number).await
    }

    async fn get_by_client(&self, client: i64) -> Result<Vec<Parcel>> {
        (**self).get_by_client(client).await
    }

    async fn set_status(&self, number: i64, status: &str) -> Result<()> {
        (**self).set_status(number, status).await
    }

    async fn set_address(&self, number: i64, address: &str) -> Result<()> {
        (**self).set_address(number, address).await
    }

    async fn delete(&self, number: i64) -> Result<()> {
        (**self).delete(number).await
    }
}
