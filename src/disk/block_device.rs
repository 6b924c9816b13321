use crate::disk::{error::Result, types::Block, types::BlockNumber};

/// 块服务调用接口
///
/// 三个调用都是同步阻塞的。只有 `read_set` 在内部整体串行化，
/// `get` 与 `put` 之间互不串行，需要跨块原子性的调用方自己加锁。
pub trait BlockDevice: Send + Sync {
    fn block_size(&self) -> usize;
    fn total_blocks(&self) -> u32;

    /// 读取一个块，返回恰好 `block_size` 字节
    fn get(&self, block_number: BlockNumber) -> Result<Block>;

    /// 写入一个块，不足 `block_size` 的部分右侧补零
    fn put(&self, block_number: BlockNumber, data: &[u8]) -> Result<()>;

    /// 原子地用 `data` 替换块内容，返回替换前的内容
    fn read_set(&self, block_number: BlockNumber, data: &[u8]) -> Result<Block>;
}
