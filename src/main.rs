use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};

use pagecache::{BufferPoolManager, PageGuard, PoolConfig, StorageError, StorageResult};

/// Inspect and exercise a disk-backed page cache
#[derive(Debug, Parser)]
#[command(name = "pagecache", version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides the configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Page size in bytes
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Number of frames in the buffer pool
    #[arg(long, global = true)]
    pool_size: Option<usize>,

    /// Upper bound on page ids
    #[arg(long, global = true)]
    max_pages: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scripted walk through allocation, eviction and pinning
    Demo,
    /// Allocate new pages
    New {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Store text at the start of a page
    Write {
        #[arg(long)]
        page: usize,
        text: String,
    },
    /// Show the start of a page
    Read {
        #[arg(long)]
        page: usize,
    },
    /// Show the frame table after loading the given pages
    Stats {
        /// Pages to fetch before printing
        pages: Vec<usize>,
    },
    /// Write the effective configuration as JSON
    InitConfig { path: PathBuf },
}

impl Cli {
    fn pool_config(&self) -> StorageResult<PoolConfig> {
        let mut config = match &self.config {
            Some(path) => PoolConfig::load(path)?,
            None => PoolConfig::default(),
        };
        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        if let Some(pool_size) = self.pool_size {
            config.pool_size = pool_size;
        }
        if let Some(max_pages) = self.max_pages {
            config.max_pages = max_pages;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> StorageResult<()> {
    let config = cli.pool_config()?;

    match &cli.command {
        Command::Demo => demo(&config),
        Command::New { count } => {
            let bpm = BufferPoolManager::open(&config)?;
            for _ in 0..*count {
                let mut page = bpm.new_page()?;
                // Dirty so the page reaches the file and the id stays taken
                page.mark_dirty();
                println!("allocated page {}", page.page_id());
            }
            bpm.close()
        }
        Command::Write { page, text } => {
            let bpm = BufferPoolManager::open(&config)?;
            {
                let mut guard = bpm.fetch_page(*page)?;
                write_text(&mut guard, text);
            }
            println!("wrote {} bytes to page {}", text.len().min(bpm.page_size()), page);
            bpm.close()
        }
        Command::Read { page } => {
            let bpm = BufferPoolManager::open(&config)?;
            let guard = bpm.fetch_page(*page)?;
            println!("page {}: \"{}\"", page, read_text(&guard));
            println!("{}", hex_dump(&guard.data()[..64.min(bpm.page_size())]));
            Ok(())
        }
        Command::Stats { pages } => {
            let bpm = BufferPoolManager::open(&config)?;
            for &page_id in pages {
                bpm.fetch_page(page_id)?;
            }
            print_frames(&bpm)?;
            Ok(())
        }
        Command::InitConfig { path } => {
            config.save(path)?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}

/// Copy `text` to the start of the page, NUL-terminated when it fits
fn write_text(page: &mut PageGuard<'_>, text: &str) {
    let mut data = page.data_mut();
    let len = text.len().min(data.len());
    data[..len].copy_from_slice(&text.as_bytes()[..len]);
    if len < data.len() {
        data[len] = 0;
    }
}

fn read_text(page: &PageGuard<'_>) -> String {
    let data = page.data();
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            format!("{:04x}  {}", i * 16, hex.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_frames(bpm: &BufferPoolManager) -> StorageResult<()> {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("frame"),
        Cell::new("page"),
        Cell::new("pins"),
        Cell::new("dirty"),
        Cell::new("state"),
    ]));
    for info in bpm.frames() {
        let page = info
            .page_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(Row::new(vec![
            Cell::new(&info.frame_id.to_string()),
            Cell::new(&page),
            Cell::new(&info.pin_count.to_string()),
            Cell::new(if info.is_dirty { "yes" } else { "no" }),
            Cell::new(&info.state.to_string()),
        ]));
    }
    table.printstd();
    println!(
        "{} resident, {} free, {} evictable, {} pages on disk",
        bpm.resident_count(),
        bpm.free_frame_count(),
        bpm.evictable_count(),
        bpm.disk_page_count()?
    );
    Ok(())
}

/// Walk through allocation, eviction with write-back, reload and pin
/// exhaustion on a fresh database file.
fn demo(config: &PoolConfig) -> StorageResult<()> {
    if config.db_path.exists() {
        std::fs::remove_file(&config.db_path)?;
    }
    let bpm = BufferPoolManager::open(config)?;
    let pool_size = bpm.pool_size();

    println!("--- phase 1: create and fill pages ---");
    let texts = ["data of page zero", "data of page one", "data of page two"];
    let mut ids = Vec::new();
    for text in texts {
        let mut page = bpm.new_page()?;
        write_text(&mut page, text);
        ids.push(page.keep_pinned());
    }
    println!("created pages {:?}", ids);
    for (i, &page_id) in ids.iter().enumerate() {
        bpm.unpin_page(page_id, i == 1)?;
    }
    println!("unpinned pages {:?}, page {} reported dirty", ids, ids[1]);

    println!("\n--- phase 2: fill the pool and trigger eviction ---");
    for _ in 0..pool_size {
        let mut page = bpm.new_page()?;
        let text = format!("auto page {}", page.page_id());
        write_text(&mut page, &text);
    }
    print_frames(&bpm)?;

    println!("\n--- phase 3: fetch evicted pages again ---");
    for &page_id in ids.iter().take(2).rev() {
        let page = bpm.fetch_page(page_id)?;
        println!("page {}: \"{}\"", page_id, read_text(&page));
    }

    println!("\n--- phase 4: pinning ---");
    let pinned = bpm.fetch_page(ids[2])?;
    println!("pinned page {}", pinned.page_id());
    let mut held = Vec::new();
    loop {
        match bpm.new_page() {
            Ok(page) => held.push(page),
            Err(StorageError::PoolExhausted(_)) => break,
            Err(err) => return Err(err),
        }
    }
    println!(
        "pool exhausted after {} new pages while page {} was pinned",
        held.len(),
        pinned.page_id()
    );
    drop(pinned);
    let page = bpm.new_page()?;
    println!("after releasing the pin, allocated page {}", page.page_id());
    drop(page);
    drop(held);

    println!("\n--- phase 5: shut down ---");
    bpm.close()?;
    println!("all dirty pages flushed");
    Ok(())
}
