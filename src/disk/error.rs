use std::time::Duration;

use thiserror::Error;

use crate::disk::types::BlockNumber;

/// 块服务错误类型
///
/// 校验和不匹配与注入的坏块对调用方不可区分，都报告为 `Corrupted`。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block {block} out of range (total {total})")]
    OutOfRange { block: BlockNumber, total: u32 },
    #[error("block data of {len} bytes exceeds block size {max}")]
    OversizedBlock { len: usize, max: usize },
    #[error("block {0} is corrupted")]
    Corrupted(BlockNumber),
    #[error("block service did not answer within {0:?}")]
    Timeout(Duration),
    #[error("block service is unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, BlockError>;
