use crate::domain::ids::{DepositId, SagaId};
use crate::domain::loan::{Deposit, Loan};
use crate::domain::ports::{LoanBookStore, SagaStore};
use crate::domain::saga::HousingSaga;
use crate::error::{KernelError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for in-flight housing sagas.
pub const CF_SAGAS: &str = "sagas";
/// Column Family for the bank's loan book.
pub const CF_LOANS: &str = "loans";
/// Column Family for deposit liabilities.
pub const CF_DEPOSITS: &str = "deposits";

/// A persistent store implementation using RocksDB.
///
/// Sagas, loans and deposits live in separate Column Families, keyed by
/// their big-endian id so iteration returns them in id order.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating any missing
    /// column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_SAGAS, CF_LOANS, CF_DEPOSITS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            KernelError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn put<T: Serialize>(&self, name: &str, key: u64, value: &T) -> Result<()> {
        let cf = self.cf(name)?;
        let bytes = serde_json::to_vec(value).map_err(|e| {
            KernelError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )))
        })?;
        self.db.put_cf(cf, key.to_be_bytes(), bytes)?;
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, name: &str, key: u64) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        match self.db.get_cf(cf, key.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, name: &str, key: u64) -> Result<()> {
        let cf = self.cf(name)?;
        self.db.delete_cf(cf, key.to_be_bytes())?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| {
                KernelError::InternalError(Box::new(std::io::Error::other(format!(
                    "RocksDB iteration error: {}",
                    e
                ))))
            })?;
            records.push(decode(&value)?);
        }
        Ok(records)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        KernelError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

#[async_trait]
impl SagaStore for RocksDBStore {
    async fn store(&self, saga: HousingSaga) -> Result<()> {
        self.put(CF_SAGAS, saga.id.0, &saga)
    }

    async fn get(&self, saga_id: SagaId) -> Result<Option<HousingSaga>> {
        self.fetch(CF_SAGAS, saga_id.0)
    }

    async fn remove(&self, saga_id: SagaId) -> Result<()> {
        self.delete(CF_SAGAS, saga_id.0)
    }

    async fn get_all(&self) -> Result<Vec<HousingSaga>> {
        self.scan(CF_SAGAS)
    }
}

#[async_trait]
impl LoanBookStore for RocksDBStore {
    async fn store_loan(&self, loan: Loan) -> Result<()> {
        self.put(CF_LOANS, loan.id.0, &loan)
    }

    async fn store_deposit(&self, deposit: Deposit) -> Result<()> {
        self.put(CF_DEPOSITS, deposit.id.0, &deposit)
    }

    async fn remove_deposit(&self, deposit_id: DepositId) -> Result<()> {
        self.delete(CF_DEPOSITS, deposit_id.0)
    }

    async fn loans(&self) -> Result<Vec<Loan>> {
        self.scan(CF_LOANS)
    }

    async fn deposits(&self) -> Result<Vec<Deposit>> {
        self.scan(CF_DEPOSITS)
    }
}
