use std::error::Error;

use colored::*;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    disk::dump::save_dump,
    fs::{
        error::FileSystemError,
        inode_table::InodeType,
        layout::ROOT_INODE,
    },
    shell::Session,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Ls,
    Pwd,
    Cd(String),
    Cat(String),
    Mkdir(String),
    Create(String),
    Ln(String, String),
    Append(String, String),
    Write(String, usize, String),
    Rm(String),
    Stat(String),
    Df,
    Fsck,
    Save,
    Format,
    Exit,
}

/// 规范化 shell 记住的路径，处理 "." 与 ".."
pub fn normalize(current: &[String], path: &str) -> Vec<String> {
    let mut parts: Vec<String> = if path.starts_with('/') {
        Vec::new()
    } else {
        current.to_vec()
    };
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name.to_string()),
        }
    }
    parts
}

pub fn execute_command(cmd: &Command, session: &mut Session) -> Result<(), Box<dyn Error>> {
    let fs = &session.fs;
    let cwd = session.cwd;

    match cmd {
        Command::Help => print_help(),
        Command::Ls => {
            for entry in fs.list_dir(cwd)? {
                let refcnt = format!("[{}]", entry.refcnt).bright_black();
                let inode = format!("#{}", entry.inode_number).bright_black();
                match entry.inode_type {
                    InodeType::Directory => {
                        println!("📁 {} {}/  {}", refcnt, entry.name.blue().bold(), inode)
                    }
                    _ => println!(
                        "📄 {} {}  {} bytes  {}",
                        refcnt, entry.name, entry.size, inode
                    ),
                }
            }
        }
        Command::Pwd => println!("📍 {}", session.display_path().cyan()),
        Command::Cd(path) => {
            let parts = normalize(&session.path, path);
            let target = fs.resolve(&format!("/{}", parts.join("/")), ROOT_INODE)?;
            if !fs.stat(target)?.is_dir() {
                return Err(FileSystemError::NotADirectory(path.clone()).into());
            }
            session.cwd = target;
            session.path = parts;
        }
        Command::Cat(path) => {
            let inode_number = fs.resolve(path, cwd)?;
            let content = fs.read(inode_number, 0, fs.layout().max_file_size)?;
            println!("{}", String::from_utf8_lossy(&content));
        }
        Command::Mkdir(path) => {
            let (dir, name) = fs.resolve_parent(path, cwd)?;
            fs.mkdir(dir, name)?;
            println!("✅ Created directory: {}", path.green());
        }
        Command::Create(path) => {
            let (dir, name) = fs.resolve_parent(path, cwd)?;
            fs.create(dir, name, InodeType::File)?;
            println!("📝 Created file: {}", path.green());
        }
        Command::Ln(target, name) => {
            fs.link(target, name, cwd)?;
            println!("🔗 {} -> {}", name.green(), target);
        }
        Command::Append(path, text) => {
            let inode_number = fs.resolve(path, cwd)?;
            let written = fs.append(inode_number, text.as_bytes())?;
            println!("✏️  Appended {} bytes to {}", written, path.cyan());
        }
        Command::Write(path, offset, text) => {
            let inode_number = fs.resolve(path, cwd)?;
            let written = fs.write(inode_number, *offset, text.as_bytes())?;
            println!("✏️  Wrote {} bytes to {} at {}", written, path.cyan(), offset);
        }
        Command::Rm(path) => {
            fs.unlink(path, cwd)?;
            println!("❌ Removed: {}", path.red());

            // 删掉的可能是当前目录或它的祖先
            let remembered = session.display_path();
            if fs.resolve(&remembered, ROOT_INODE).ok() != Some(cwd) {
                println!("📍 {} is gone, back to /", remembered.cyan());
                session.cwd = ROOT_INODE;
                session.path.clear();
            }
        }
        Command::Stat(path) => {
            let inode_number = fs.resolve(path, cwd)?;
            let inode = fs.stat(inode_number)?;
            let blocks: Vec<String> = inode.blocks().map(|b| b.to_string()).collect();
            println!(
                "{}\n{}: {}\n{}: {:?}\n{}: {} bytes\n{}: {}\n{}: [{}]",
                "📊 File Info".bright_yellow().bold(),
                "Inode".blue(),
                inode_number,
                "Type".blue(),
                inode.inode_type,
                "Size".blue(),
                inode.size,
                "Links".blue(),
                inode.refcnt,
                "Blocks".blue(),
                blocks.join(", ")
            );
        }
        Command::Df => {
            let usage = fs.usage()?;
            let layout = fs.layout();
            println!(
                "💾 blocks: {}/{} free ({} bytes each)\n🧾 inodes: {}/{} free",
                usage.free_blocks,
                usage.data_blocks,
                layout.block_size,
                usage.free_inodes,
                usage.total_inodes
            );
        }
        Command::Fsck => {
            let problems = fs.check()?;
            if problems.is_empty() {
                println!("{}", "✅ File system is consistent".green());
            }
            for problem in problems {
                println!("{} {}", "⚠️ ".yellow(), problem);
            }
        }
        Command::Save => {
            save_with_progress(session)?;
            println!("💾 Saved to {}", session.dump_path.display().to_string().cyan());
        }
        Command::Format => {
            let confirmed = Confirm::new()
                .with_prompt("Format the block store? All data will be lost")
                .default(false)
                .interact()?;
            if !confirmed {
                println!("{}", "Format cancelled".bright_black());
                return Ok(());
            }
            fs.format()?;
            fs.mount()?;
            session.cwd = ROOT_INODE;
            session.path.clear();
            println!("{}", "✅ Disk formatted successfully!".green());
        }
        Command::Exit => println!("{}", "👋 Exiting MiniFS shell...".yellow().bold()),
    }

    Ok(())
}

pub fn save_with_progress(session: &Session) -> Result<(), FileSystemError> {
    let pb = ProgressBar::new(0);
    let template = "[{bar:40.green/black}] {pos:>4}/{len} blocks";
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("#>-"));
    }
    save_dump(
        &session.store,
        &session.fs.layout().geometry,
        &session.dump_path,
        &pb,
    )
}

fn print_help() {
    println!("{}", "📘 MiniFS Commands".bright_cyan().bold());
    println!(
        "{}",
        "
  ls                   List current directory ([links] name)
  pwd                  Print current path
  cd <path>            Change directory
  cat <path>           Print file content
  mkdir <path>         Create directory
  create <path>        Create empty file
  ln <target> <name>   Hard link <name> to <target>
  append <path> <text> Append text to file
  write <path> <offset> <text>
                       Write text at a byte offset
  rm <path>            Remove a link (frees the file with its last link)
  stat <path>          Show inode info
  df                   Show free blocks and inodes
  fsck                 Check file system consistency
  save                 Dump the block store to disk
  format               Format the block store
  help                 Show this help message
  exit                 Save and quit the shell
"
        .bright_black()
    );
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc};

    use super::*;
    use crate::{
        disk::MemoryDisk,
        fs::{config::Geometry, FileSystem},
        shell::parse::parse_command,
    };

    fn session() -> Session {
        let geometry = Geometry::default();
        let store = Arc::new(MemoryDisk::new(geometry.block_size, geometry.total_blocks));
        let fs = FileSystem::new(store.clone(), geometry).unwrap();
        fs.format().unwrap();
        fs.mount().unwrap();
        Session::new(fs, store, PathBuf::from("unused.dump"))
    }

    fn run(session: &mut Session, line: &str) -> Result<(), Box<dyn Error>> {
        execute_command(&parse_command(line).unwrap(), session)
    }

    fn parts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_handles_dots() {
        let current = parts(&["a", "b"]);
        assert_eq!(normalize(&current, ".."), parts(&["a"]));
        assert_eq!(normalize(&current, "../c/./d"), parts(&["a", "c", "d"]));
        assert_eq!(normalize(&current, "/x//y"), parts(&["x", "y"]));
        assert_eq!(normalize(&current, "../../../.."), Vec::<String>::new());
    }

    #[test]
    fn cd_tracks_path_and_inode() {
        let mut session = session();
        run(&mut session, "mkdir a").unwrap();
        run(&mut session, "cd a").unwrap();
        run(&mut session, "mkdir b").unwrap();
        run(&mut session, "cd b").unwrap();
        assert_eq!(session.display_path(), "/a/b");

        run(&mut session, "cd ..").unwrap();
        assert_eq!(session.display_path(), "/a");
        assert_eq!(session.cwd, session.fs.resolve("/a", ROOT_INODE).unwrap());

        run(&mut session, "create f").unwrap();
        assert!(run(&mut session, "cd f").is_err());
        assert_eq!(session.display_path(), "/a");

        run(&mut session, "cd /").unwrap();
        assert_eq!(session.cwd, ROOT_INODE);
    }

    #[test]
    fn errors_leave_session_usable() {
        let mut session = session();
        assert!(run(&mut session, "cat missing").is_err());
        assert!(run(&mut session, "cd nowhere").is_err());

        run(&mut session, "create notes").unwrap();
        run(&mut session, "append notes hello world").unwrap();
        run(&mut session, "ln notes copy").unwrap();
        run(&mut session, "ls").unwrap();
        run(&mut session, "stat copy").unwrap();

        let copy = session.fs.resolve("copy", ROOT_INODE).unwrap();
        assert_eq!(session.fs.read(copy, 0, 256).unwrap(), b"hello world".to_vec());
        assert_eq!(session.fs.stat(copy).unwrap().refcnt, 2);

        run(&mut session, "write copy 6 there").unwrap();
        assert_eq!(session.fs.read(copy, 0, 256).unwrap(), b"hello there".to_vec());

        run(&mut session, "rm notes").unwrap();
        run(&mut session, "fsck").unwrap();
        assert!(session.fs.check().unwrap().is_empty());
    }

    #[test]
    fn removing_current_directory_returns_to_root() {
        let mut session = session();
        run(&mut session, "mkdir a").unwrap();
        run(&mut session, "cd a").unwrap();
        run(&mut session, "mkdir b").unwrap();
        run(&mut session, "cd b").unwrap();

        run(&mut session, "rm /a/b").unwrap();
        assert_eq!(session.cwd, ROOT_INODE);
        assert_eq!(session.display_path(), "/");
        run(&mut session, "ls").unwrap();
        run(&mut session, "create f").unwrap();
        assert!(session.fs.resolve("/f", ROOT_INODE).is_ok());
    }

    #[test]
    fn removing_elsewhere_keeps_current_directory() {
        let mut session = session();
        run(&mut session, "mkdir a").unwrap();
        run(&mut session, "create /other").unwrap();
        run(&mut session, "cd a").unwrap();
        let a = session.cwd;

        run(&mut session, "rm /other").unwrap();
        assert_eq!(session.cwd, a);
        assert_eq!(session.display_path(), "/a");
    }
}
