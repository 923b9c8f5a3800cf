use crate::domain::enrollment::Enrollment;
use crate::domain::order::{Order, OrderNo, OrderStatus};
use crate::domain::ports::{EnrollmentStore, OrderStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing orders, keyed by order number.
pub const CF_ORDERS: &str = "orders";
/// Column Family for storing enrollments, keyed by big-endian id.
pub const CF_ENROLLMENTS: &str = "enrollments";
/// Column Family mapping an order number to the enrollment that references it.
pub const CF_ENROLLMENT_ORDERS: &str = "enrollment_orders";

/// A persistent store implementation using RocksDB.
///
/// Handles storage for both `Order` and `Enrollment` entities using separate
/// Column Families. Read-check-write sequences on orders run under `write_lock`
/// so a conditional update cannot interleave with another writer.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_ORDERS, CF_ENROLLMENTS, CF_ENROLLMENT_ORDERS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(&cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(&cf, key, bytes)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = order.order_no.as_str().as_bytes();
        if self.read::<Order>(CF_ORDERS, key)?.is_some() {
            return Err(PaymentError::DuplicateOrder(order.order_no));
        }
        self.write(CF_ORDERS, key, &order)
    }

    async fn get(&self, order_no: &OrderNo) -> Result<Option<Order>> {
        self.read(CF_ORDERS, order_no.as_str().as_bytes())
    }

    async fn update_if(&self, order: Order, expected: OrderStatus) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = order.order_no.as_str().as_bytes();
        match self.read::<Order>(CF_ORDERS, key)? {
            Some(current) if current.status == expected => {
                self.write(CF_ORDERS, key, &order)?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PaymentError::OrderNotFound(order.order_no)),
        }
    }

    async fn get_all(&self) -> Result<Vec<Order>> {
        // Keys are order numbers, so iteration order is already sorted.
        self.scan(CF_ORDERS)
    }
}

#[async_trait]
impl EnrollmentStore for RocksDBStore {
    async fn store(&self, enrollment: Enrollment) -> Result<()> {
        let enrollments = self.cf(CF_ENROLLMENTS)?;
        let index = self.cf(CF_ENROLLMENT_ORDERS)?;
        let id = enrollment.id.to_be_bytes();

        let mut batch = WriteBatch::default();
        batch.put_cf(&enrollments, id, serde_json::to_vec(&enrollment)?);
        if let Some(order_no) = &enrollment.order_no {
            batch.put_cf(&index, order_no.as_str().as_bytes(), id);
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: u64) -> Result<Option<Enrollment>> {
        self.read(CF_ENROLLMENTS, &id.to_be_bytes())
    }

    async fn find_by_order(&self, order_no: &OrderNo) -> Result<Option<Enrollment>> {
        let index = self.cf(CF_ENROLLMENT_ORDERS)?;
        let Some(raw_id) = self.db.get_pinned_cf(&index, order_no.as_str().as_bytes())? else {
            return Ok(None);
        };
        let id: [u8; 8] = raw_id.as_ref().try_into().map_err(|_| {
            PaymentError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("corrupt enrollment index entry for {order_no}"),
            )))
        })?;

        // The index is never pruned; an enrollment re-pointed at another order
        // leaves a stale entry behind.
        let enrollment: Option<Enrollment> = self.read(CF_ENROLLMENTS, &id)?;
        Ok(enrollment.filter(|e| e.order_no.as_ref() == Some(order_no)))
    }

    async fn get_all(&self) -> Result<Vec<Enrollment>> {
        self.scan(CF_ENROLLMENTS)
    }
}
