use crate::fs::{
    directory::Directory,
    error::{FileSystemError, Result},
    inode_table::InodeTable,
    layout::{InodeNumber, ROOT_INODE},
};

pub const SEPARATOR: char = '/';

/// 路径分量，跳过空分量和 "."
fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|c| !c.is_empty() && *c != ".")
}

fn start_of(path: &str, cwd: InodeNumber) -> InodeNumber {
    if path.starts_with(SEPARATOR) {
        ROOT_INODE
    } else {
        cwd
    }
}

/// 把绝对路径或相对 `cwd` 的路径解析为 inode 号
pub fn resolve(table: &InodeTable, path: &str, cwd: InodeNumber) -> Result<InodeNumber> {
    let mut current = start_of(path, cwd);
    let mut walked = String::new();

    for component in components(path) {
        let dir = Directory::open(table, current).map_err(|e| match e {
            FileSystemError::NotADirectory(_) if walked.is_empty() => {
                FileSystemError::NotADirectory(".".to_string())
            }
            FileSystemError::NotADirectory(_) => FileSystemError::NotADirectory(walked.clone()),
            other => other,
        })?;

        if !walked.is_empty() {
            walked.push(SEPARATOR);
        }
        walked.push_str(component);

        current = dir.lookup(component).map_err(|e| match e {
            FileSystemError::NotFound(_) => FileSystemError::NotFound(walked.clone()),
            other => other,
        })?;
    }
    Ok(current)
}

/// 解析到父目录，返回 (父目录 inode 号, 最后一个分量)
pub fn resolve_parent<'p>(
    table: &InodeTable,
    path: &'p str,
    cwd: InodeNumber,
) -> Result<(InodeNumber, &'p str)> {
    let trimmed = path.trim_end_matches(SEPARATOR);
    let (parent, name) = match trimmed.rfind(SEPARATOR) {
        Some(0) => ("/", &trimmed[1..]),
        Some(at) => (&trimmed[..at], &trimmed[at + 1..]),
        None => ("", trimmed),
    };

    if name.is_empty() || name == "." {
        return Err(FileSystemError::InvalidName(path.to_string()));
    }

    let parent_inode = resolve(table, parent, start_of(path, cwd))?;
    Directory::open(table, parent_inode)
        .map_err(|_| FileSystemError::NotADirectory(parent.to_string()))?;
    Ok((parent_inode, name))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        disk::{BlockDevice, MemoryDisk},
        fs::{
            config::Geometry,
            data_block_bitmap::DataBlockBitmap,
            inode_table::{Inode, InodeType},
            layout::Layout,
        },
    };

    /// 构造 /a/b（目录）和 /a/f（文件）
    fn tree() -> InodeTable {
        let geometry = Geometry::default();
        let disk: Arc<dyn BlockDevice> =
            Arc::new(MemoryDisk::new(geometry.block_size, geometry.total_blocks));
        let layout = Layout::new(geometry);
        let table = InodeTable::new(Arc::clone(&disk), layout, DataBlockBitmap::new(disk, layout));

        table.write(0, &Inode::new(InodeType::Directory, 2)).unwrap();
        table.write(1, &Inode::new(InodeType::Directory, 2)).unwrap();
        table.write(2, &Inode::new(InodeType::Directory, 2)).unwrap();
        table.write(3, &Inode::new(InodeType::File, 2)).unwrap();

        let link = |dir: InodeNumber, name: &str, target: InodeNumber| {
            let dir = Directory::open(&table, dir).unwrap();
            let slot = dir.find_available_entry().unwrap();
            dir.insert_entry(slot, name, target).unwrap();
        };
        link(0, "a", 1);
        link(1, "b", 2);
        link(1, "f", 3);
        table
    }

    #[test]
    fn absolute_matches_relative() {
        let table = tree();
        let a = resolve(&table, "/a", 2).unwrap();
        assert_eq!(a, 1);

        for cwd in [0, 1, 2] {
            assert_eq!(resolve(&table, "/a/b", cwd).unwrap(), 2);
        }
        assert_eq!(resolve(&table, "b", a).unwrap(), 2);
    }

    #[test]
    fn empty_components_are_skipped() {
        let table = tree();
        assert_eq!(resolve(&table, "./a//b/", 0).unwrap(), 2);
        assert_eq!(resolve(&table, ".", 1).unwrap(), 1);
        assert_eq!(resolve(&table, "", 2).unwrap(), 2);
        assert_eq!(resolve(&table, "/", 2).unwrap(), 0);
    }

    #[test]
    fn reports_first_failure() {
        let table = tree();
        match resolve(&table, "/a/missing/x", 0) {
            Err(FileSystemError::NotFound(path)) => assert_eq!(path, "a/missing"),
            other => panic!("unexpected {:?}", other),
        }
        match resolve(&table, "/a/f/x", 0) {
            Err(FileSystemError::NotADirectory(path)) => assert_eq!(path, "a/f"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parent_and_leaf() {
        let table = tree();
        assert_eq!(resolve_parent(&table, "/a/b", 0).unwrap(), (1, "b"));
        assert_eq!(resolve_parent(&table, "new", 1).unwrap(), (1, "new"));
        assert_eq!(resolve_parent(&table, "/top", 2).unwrap(), (0, "top"));
        assert!(matches!(
            resolve_parent(&table, "/", 0),
            Err(FileSystemError::InvalidName(_))
        ));
        assert!(matches!(
            resolve_parent(&table, "a/f/x", 0),
            Err(FileSystemError::NotADirectory(_))
        ));
    }
}
