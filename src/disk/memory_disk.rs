use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::disk::{
    block_device::BlockDevice,
    error::{BlockError, Result},
    fault::FaultPolicy,
    types::{Block, BlockNumber},
};

/// 存储中的一个块：数据加上写入时计算的校验和
#[derive(Debug)]
struct StoredBlock {
    data: Block,
    checksum: u32,
}

impl StoredBlock {
    fn zeroed(block_size: usize) -> Self {
        Self::sealed(vec![0; block_size])
    }

    fn sealed(data: Block) -> Self {
        let checksum = crc32fast::hash(&data);
        Self { data, checksum }
    }

    fn is_intact(&self) -> bool {
        crc32fast::hash(&self.data) == self.checksum
    }
}

/// 内存中的块数组，块服务的服务端实现
///
/// 每个块各自加锁，只保证单次读写的内存安全；`get` 与 `put` 之间
/// 并不串行。`read_set` 额外持有 `swap` 锁，整个读-写过程独占。
#[derive(Debug)]
pub struct MemoryDisk {
    blocks: Vec<Mutex<StoredBlock>>,
    block_size: usize,
    swap: Mutex<()>,
    faults: Box<dyn FaultPolicy>,
}

impl MemoryDisk {
    #[cfg(test)]
    pub fn new(block_size: usize, total_blocks: u32) -> Self {
        Self::with_faults(block_size, total_blocks, Box::new(crate::disk::fault::NoFaults))
    }

    pub fn with_faults(block_size: usize, total_blocks: u32, faults: Box<dyn FaultPolicy>) -> Self {
        let blocks = (0..total_blocks)
            .map(|_| Mutex::new(StoredBlock::zeroed(block_size)))
            .collect();

        Self {
            blocks,
            block_size,
            swap: Mutex::new(()),
            faults,
        }
    }

    /// 由已有的块内容重建存储，重新计算每个块的校验和
    pub fn from_blocks(
        block_size: usize,
        blocks: Vec<Block>,
        faults: Box<dyn FaultPolicy>,
    ) -> Result<Self> {
        let blocks = blocks
            .into_iter()
            .map(|mut data| {
                if data.len() > block_size {
                    return Err(BlockError::OversizedBlock {
                        len: data.len(),
                        max: block_size,
                    });
                }
                data.resize(block_size, 0);
                Ok(Mutex::new(StoredBlock::sealed(data)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            blocks,
            block_size,
            swap: Mutex::new(()),
            faults,
        })
    }

    /// 导出全部块的原始内容，不做校验
    pub fn snapshot(&self) -> Vec<Block> {
        self.blocks
            .iter()
            .map(|slot| lock(slot).data.clone())
            .collect()
    }

    fn slot(&self, block_number: BlockNumber) -> Result<&Mutex<StoredBlock>> {
        self.blocks
            .get(block_number as usize)
            .ok_or(BlockError::OutOfRange {
                block: block_number,
                total: self.total_blocks(),
            })
    }

    /// 绕过校验和直接改写块内的一个字节，模拟介质损坏
    #[cfg(test)]
    pub fn tamper(&self, block_number: BlockNumber, index: usize, value: u8) {
        let mut stored = lock(&self.blocks[block_number as usize]);
        stored.data[index] = value;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BlockDevice for MemoryDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> u32 {
        self.blocks.len() as u32
    }

    fn get(&self, block_number: BlockNumber) -> Result<Block> {
        debug!("get: block {}", block_number);
        let slot = self.slot(block_number)?;

        if self.faults.is_damaged(block_number) {
            warn!("get: injected fault on block {}", block_number);
            return Err(BlockError::Corrupted(block_number));
        }

        let stored = lock(slot);
        if !stored.is_intact() {
            warn!("get: checksum mismatch on block {}", block_number);
            return Err(BlockError::Corrupted(block_number));
        }
        Ok(stored.data.clone())
    }

    fn put(&self, block_number: BlockNumber, data: &[u8]) -> Result<()> {
        debug!("put: block {} len {}", block_number, data.len());
        if data.len() > self.block_size {
            return Err(BlockError::OversizedBlock {
                len: data.len(),
                max: self.block_size,
            });
        }
        let slot = self.slot(block_number)?;

        let mut padded = data.to_vec();
        padded.resize(self.block_size, 0);
        *lock(slot) = StoredBlock::sealed(padded);
        Ok(())
    }

    fn read_set(&self, block_number: BlockNumber, data: &[u8]) -> Result<Block> {
        let _swap = lock(&self.swap);
        let previous = self.get(block_number)?;
        self.put(block_number, data)?;
        Ok(previous)
    }
}
