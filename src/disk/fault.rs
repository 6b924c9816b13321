use crate::disk::types::BlockNumber;

/// 故障注入策略，在构造块存储时传入
///
/// 每个存储实例持有自己的策略，测试之间互不干扰。
pub trait FaultPolicy: Send + Sync + std::fmt::Debug {
    /// 返回 true 时，对该块的 `get` 一律报告损坏
    fn is_damaged(&self, block_number: BlockNumber) -> bool;
}

/// 不注入任何故障
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultPolicy for NoFaults {
    fn is_damaged(&self, _block_number: BlockNumber) -> bool {
        false
    }
}

/// 模拟单个坏块
#[derive(Debug, Clone, Copy)]
pub struct DamagedBlock(pub BlockNumber);

impl FaultPolicy for DamagedBlock {
    fn is_damaged(&self, block_number: BlockNumber) -> bool {
        self.0 == block_number
    }
}
