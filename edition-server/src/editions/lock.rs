//! 按商品的互斥锁
//!
//! 同一商品同一时刻只允许一个重排在进行；不同商品互不阻塞。

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct ProductLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 持有商品锁执行 `f`
    pub async fn with_product_lock<F, Fut, T>(&self, product_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // DashMap 分片锁必须在 await 前释放
        let lock = self
            .locks
            .entry(product_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;
        f().await
    }

    /// 当前登记的商品数
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
