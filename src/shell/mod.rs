pub mod command;
pub mod parse;

use std::{io::stdout, path::PathBuf, sync::Arc};

use colored::*;
use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use log::{info, warn};
use reedline::{
    DefaultCompleter, DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal,
};

use crate::{
    disk::MemoryDisk,
    fs::{
        layout::{InodeNumber, ROOT_INODE},
        FileSystem,
    },
    shell::{
        command::{execute_command, save_with_progress, Command},
        parse::parse_command,
    },
};

/// 一次 shell 会话的状态
pub struct Session {
    pub fs: FileSystem,
    pub store: Arc<MemoryDisk>, // 服务端块存储，转储时直接读取
    pub dump_path: PathBuf,
    pub cwd: InodeNumber,
    pub path: Vec<String>, // 当前目录的路径分量，只用于显示和 `cd ..`
}

impl Session {
    pub fn new(fs: FileSystem, store: Arc<MemoryDisk>, dump_path: PathBuf) -> Self {
        Self {
            fs,
            store,
            dump_path,
            cwd: ROOT_INODE,
            path: Vec::new(),
        }
    }

    pub fn display_path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    /// 退出前卸载并转储
    fn shutdown(&self) {
        if let Err(e) = self.fs.unmount() {
            warn!("unmount failed: {}", e);
        }
        match save_with_progress(self) {
            Ok(()) => println!("💾 Saved to {}", self.dump_path.display().to_string().cyan()),
            Err(e) => println!("{} {}", "❌ Error:".red().bold(), e),
        }
    }
}

pub fn start_shell(mut session: Session) {
    banner();

    let username = whoami::username();
    let hostname = whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string());

    println!(
        "{}",
        "Type 'help' for available commands. Use ↑↓ for history, Tab for auto-completion.\n"
            .bright_black()
    );

    // 初始化 reedline
    let history_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".minifs_history");

    let mut line_editor = Reedline::create();
    match FileBackedHistory::with_file(100, history_path) {
        Ok(history) => line_editor = line_editor.with_history(Box::new(history)),
        Err(e) => warn!("history disabled: {}", e),
    }

    // 命令补全
    let commands = vec![
        "help", "ls", "pwd", "cd", "cat", "mkdir", "create", "ln", "append", "write", "rm", "stat",
        "df", "fsck", "save", "format", "exit",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    let completer = DefaultCompleter::new_with_wordlen(commands, 2);
    line_editor = line_editor.with_completer(Box::new(completer));

    let prompt = DefaultPrompt::new(
        DefaultPromptSegment::Empty,
        DefaultPromptSegment::Basic("MiniFS".bright_blue().bold().to_string()),
    );

    loop {
        let full_prompt = format!(
            "{}:{}",
            format!("{}@{}", username, hostname).green(),
            session.display_path().blue()
        );
        let prompt = DefaultPrompt {
            left_prompt: DefaultPromptSegment::Basic(full_prompt),
            ..prompt.clone()
        };

        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                let trimmed = buffer.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match parse_command(trimmed) {
                    Ok(cmd) => {
                        if let Err(e) = execute_command(&cmd, &mut session) {
                            println!("{} {}", "❌ Error:".red().bold(), e);
                        }
                        if cmd == Command::Exit {
                            break;
                        }
                    }
                    Err(msg) => println!("{} {}", "⚠️ ".yellow(), msg.yellow()),
                }
            }
            Ok(Signal::CtrlC) => {
                println!();
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("{}", "Exiting MiniFS...".yellow());
                break;
            }
            Err(e) => {
                println!("Error reading line: {}", e);
                break;
            }
        }
    }

    session.shutdown();
    info!("shell closed");
    println!("{}", "GoodBye!".bright_yellow());
}

/// 启动横幅
fn banner() {
    let mut stdout = stdout();
    let _ = execute!(
        stdout,
        Clear(ClearType::All),
        cursor::MoveTo(0, 0),
        SetForegroundColor(Color::Cyan),
        Print("Welcome to MiniFS v0.1.0\n"),
        ResetColor
    );
}
