use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use log::{trace, warn};

use crate::{
    disk::{BlockDevice, BlockNumber},
    fs::error::Result,
};

/// 锁块首字节：空闲
pub const UNLOCKED: u8 = 0;
/// 锁块首字节：已被某个客户端持有
pub const LOCKED: u8 = 1;

const RETRY_DELAY: Duration = Duration::from_millis(1);
const WARN_EVERY: u32 = 1000;

/// 整个文件系统共用的一把锁
///
/// 创建、建链、追加、删除等跨多个块的操作全程持有它；
/// 只读操作不加锁，可能看到进行中的修改。锁不可重入。
///
/// 分两层：进程内的 `Mutex` 先把本客户端的线程排队，
/// 然后用 `read_set` 在锁块上换入 `LOCKED`，前值为 `UNLOCKED` 才算拿到，
/// 否则稍等重试。共享同一块存储的其他客户端因此也互斥。
pub struct CompoundLock {
    local: Mutex<()>,
    disk: Arc<dyn BlockDevice>,
    block: BlockNumber,
}

/// 持锁期间的守卫，离开作用域时先写回 `UNLOCKED`，再释放进程内的锁
pub struct CompoundGuard<'a> {
    lock: &'a CompoundLock,
    _local: MutexGuard<'a, ()>,
}

impl CompoundLock {
    pub fn new(disk: Arc<dyn BlockDevice>, block: BlockNumber) -> Self {
        Self {
            local: Mutex::new(()),
            disk,
            block,
        }
    }

    /// 获取锁；锁块读写失败时返回错误，进程内的锁随之释放
    pub fn acquire(&self) -> Result<CompoundGuard<'_>> {
        // 持锁线程 panic 时块上的状态照旧可用，毒化不影响后续操作
        let local = self.local.lock().unwrap_or_else(PoisonError::into_inner);

        let mut attempts: u32 = 0;
        loop {
            let previous = self.disk.read_set(self.block, &[LOCKED])?;
            if previous.first().copied().unwrap_or(UNLOCKED) == UNLOCKED {
                break;
            }
            attempts += 1;
            if attempts % WARN_EVERY == 0 {
                warn!(
                    "compound lock: block {} still held after {} attempts",
                    self.block, attempts
                );
            }
            thread::sleep(RETRY_DELAY);
        }

        trace!("compound lock: acquired after {} retries", attempts);
        Ok(CompoundGuard {
            lock: self,
            _local: local,
        })
    }

    /// 强制把锁块写回空闲，格式化时使用
    pub fn reset(&self) -> Result<()> {
        self.disk.put(self.block, &[UNLOCKED])?;
        Ok(())
    }
}

impl Drop for CompoundGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.disk.put(self.lock.block, &[UNLOCKED]) {
            warn!("compound lock: release of block {} failed: {}", self.lock.block, e);
        }
        trace!("compound lock: released");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Instant,
    };

    use super::*;
    use crate::disk::{DamagedBlock, MemoryDisk};

    #[test]
    fn guard_marks_and_clears_lock_block() {
        let disk = Arc::new(MemoryDisk::new(8, 2));
        let lock = CompoundLock::new(disk.clone(), 0);

        {
            let _guard = lock.acquire().unwrap();
            assert_eq!(disk.get(0).unwrap()[0], LOCKED);
        }
        assert_eq!(disk.get(0).unwrap()[0], UNLOCKED);

        // 释放后可以再次获取
        drop(lock.acquire().unwrap());
    }

    #[test]
    fn second_client_waits_for_holder() {
        let disk = Arc::new(MemoryDisk::new(8, 2));
        let first = Arc::new(CompoundLock::new(disk.clone(), 0));
        let second = Arc::new(CompoundLock::new(disk.clone(), 0));
        let hold = Duration::from_millis(100);

        let guard = first.acquire().unwrap();
        let started = Instant::now();
        let waiter = {
            let second = Arc::clone(&second);
            thread::spawn(move || {
                let _guard = second.acquire().unwrap();
                started.elapsed()
            })
        };

        thread::sleep(hold);
        drop(guard);
        assert!(waiter.join().unwrap() >= hold);
    }

    #[test]
    fn clients_never_overlap() {
        let disk = Arc::new(MemoryDisk::new(8, 2));
        let inside = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = CompoundLock::new(disk.clone(), 0);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = lock.acquire().unwrap();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        thread::sleep(Duration::from_micros(200));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn damaged_lock_block_is_an_error() {
        let disk = Arc::new(MemoryDisk::with_faults(8, 2, Box::new(DamagedBlock(0))));
        let lock = CompoundLock::new(disk, 0);
        assert!(lock.acquire().is_err());
    }

    #[test]
    fn reset_clears_stale_lock() {
        let disk = Arc::new(MemoryDisk::new(8, 2));
        disk.put(0, &[LOCKED]).unwrap();

        let lock = CompoundLock::new(disk, 0);
        lock.reset().unwrap();
        drop(lock.acquire().unwrap());
    }
}
