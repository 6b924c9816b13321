use std::{error::Error, fs::File, path::Path, process, sync::Arc, time::Duration};

use clap::Parser;
use colored::*;
use env_logger::{Env, Target};
use indicatif::ProgressBar;
use log::info;

use crate::{
    cli::Cli,
    disk::{dump, init::prepare_disk, BlockClient, DamagedBlock, FaultPolicy, NoFaults},
    fs::FileSystem,
    shell::{start_shell, Session},
};

mod cli;
mod disk;
mod fs;
mod shell;

fn init_logging(path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn boot(cli: &Cli) -> Result<Session, Box<dyn Error>> {
    let geometry = cli.geometry();
    let prefix = dump::parse_prefix(&cli.prefix)
        .ok_or_else(|| format!("prefix '{}' is not a hex string", cli.prefix))?;
    let dump_path = dump::dump_path(&cli.dump_dir, &prefix, &geometry);

    let faults: Box<dyn FaultPolicy> = match cli.damaged_block {
        Some(block) => Box::new(DamagedBlock(block)),
        None => Box::new(NoFaults),
    };

    let prepared = prepare_disk(&geometry, &dump_path, cli.fresh, faults, &ProgressBar::hidden())?;
    let store = Arc::new(prepared.disk);
    let client = BlockClient::connect(store.clone(), Duration::from_millis(cli.timeout_ms));

    let fs = FileSystem::new(Arc::new(client), geometry)?;
    if prepared.needs_format {
        fs.format()?;
    } else {
        // 存储刚载入，还没有别的客户端
        fs.clear_stale_lock()?;
    }
    fs.mount()?;

    Ok(Session::new(fs, store, dump_path))
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_file) {
        eprintln!("{} cannot open log file: {}", "❌ Error:".red().bold(), e);
        process::exit(1);
    }
    info!("starting with {:?}", cli.geometry());

    match boot(&cli) {
        Ok(session) => start_shell(session),
        Err(e) => {
            eprintln!("{} {}", "❌ Error:".red().bold(), e);
            process::exit(1);
        }
    }
}
