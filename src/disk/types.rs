/// 块号：块服务中每个块的编号，范围 `[0, total_blocks)`
pub type BlockNumber = u32;

/// 一个逻辑块的内容，长度恒等于块大小
pub type Block = Vec<u8>;

/// 引导块，永远不参与分配
pub const BOOT_BLOCK: BlockNumber = 0;

/// 超级块固定在 1 号块
pub const SUPER_BLOCK: BlockNumber = 1;
