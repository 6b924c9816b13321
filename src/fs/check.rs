use std::{collections::HashMap, fmt};

use crate::{
    disk::BlockNumber,
    fs::{
        directory::Directory,
        error::Result,
        inode_table::InodeTable,
        layout::{InodeNumber, ROOT_INODE},
    },
};

/// 一致性检查发现的问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// 块被 inode 引用，但位图标记为空闲
    UnmarkedBlock { block: BlockNumber, inode: InodeNumber },
    /// 位图标记已用，但没有 inode 引用
    LeakedBlock(BlockNumber),
    /// 同一个块被多处引用
    SharedBlock { block: BlockNumber, inodes: Vec<InodeNumber> },
    /// 引用了数据区以外的块
    ForeignBlock { block: BlockNumber, inode: InodeNumber },
    /// size 超过已分配块能容纳的范围
    SizeOverflow { inode: InodeNumber, size: u32 },
    /// 目录项指向空闲 inode
    DanglingEntry { dir: InodeNumber, name: String, target: InodeNumber },
    /// refcnt 与指向它的目录项数不符
    RefcntMismatch { inode: InodeNumber, refcnt: u16, links: u16 },
    /// 根目录缺失或不是目录
    BadRoot,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmarkedBlock { block, inode } => {
                write!(f, "block {} used by inode {} is marked free", block, inode)
            }
            Self::LeakedBlock(block) => {
                write!(f, "block {} is marked used but unreferenced", block)
            }
            Self::SharedBlock { block, inodes } => {
                write!(f, "block {} is referenced by inodes {:?}", block, inodes)
            }
            Self::ForeignBlock { block, inode } => {
                write!(f, "inode {} references non-data block {}", inode, block)
            }
            Self::SizeOverflow { inode, size } => {
                write!(f, "inode {} size {} exceeds its block capacity", inode, size)
            }
            Self::DanglingEntry { dir, name, target } => write!(
                f,
                "entry '{}' in directory {} points at free inode {}",
                name, dir, target
            ),
            Self::RefcntMismatch {
                inode,
                refcnt,
                links,
            } => write!(
                f,
                "inode {} has refcnt {} but {} directory entries",
                inode, refcnt, links
            ),
            Self::BadRoot => write!(f, "root inode is not a directory"),
        }
    }
}

/// 遍历 inode 表与位图，报告所有违反不变量的地方
pub fn check(table: &InodeTable) -> Result<Vec<Problem>> {
    let layout = table.layout();
    let inodes = table.read_all()?;
    let mut problems = Vec::new();
    let mut owners: HashMap<BlockNumber, Vec<InodeNumber>> = HashMap::new();
    let mut links: HashMap<InodeNumber, u16> = HashMap::new();

    match inodes.first() {
        Some((_, root)) if root.is_dir() => {}
        _ => problems.push(Problem::BadRoot),
    }

    for (inode_number, inode) in inodes.iter().filter(|(_, inode)| inode.is_valid()) {
        let limit = inode.block_numbers.len() * layout.block_size;
        if inode.size as usize > limit {
            problems.push(Problem::SizeOverflow {
                inode: *inode_number,
                size: inode.size,
            });
        }

        for block in inode.blocks() {
            if block < layout.data_start || block >= layout.total_blocks {
                problems.push(Problem::ForeignBlock {
                    block,
                    inode: *inode_number,
                });
                continue;
            }
            owners.entry(block).or_default().push(*inode_number);
        }

        if inode.is_dir() {
            for entry in Directory::open(table, *inode_number)?.entries()? {
                let target_valid = inodes
                    .get(entry.inode_number as usize)
                    .is_some_and(|(_, target)| target.is_valid());
                if !target_valid {
                    problems.push(Problem::DanglingEntry {
                        dir: *inode_number,
                        name: entry.name,
                        target: entry.inode_number,
                    });
                    continue;
                }
                *links.entry(entry.inode_number).or_default() += 1;
            }
        }
    }

    let used = table.bitmap().used_blocks()?;
    for block in &used {
        if !owners.contains_key(block) {
            problems.push(Problem::LeakedBlock(*block));
        }
    }

    let mut owned: Vec<_> = owners.into_iter().collect();
    owned.sort_by_key(|(block, _)| *block);
    for (block, inodes) in owned {
        if used.binary_search(&block).is_err() {
            problems.push(Problem::UnmarkedBlock {
                block,
                inode: inodes[0],
            });
        }
        if inodes.len() > 1 {
            problems.push(Problem::SharedBlock { block, inodes });
        }
    }

    for (inode_number, inode) in inodes.iter().filter(|(_, inode)| inode.is_valid()) {
        // 根目录没有指向自己的目录项
        if *inode_number == ROOT_INODE {
            continue;
        }
        let count = links.get(inode_number).copied().unwrap_or(0);
        if count != inode.refcnt {
            problems.push(Problem::RefcntMismatch {
                inode: *inode_number,
                refcnt: inode.refcnt,
                links: count,
            });
        }
    }

    Ok(problems)
}
