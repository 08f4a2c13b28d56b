//! pagestore - inspect and maintain a paged data file

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use pagestore::storage::{PageId, PageType, Pager, StorageError};
use pagestore::PagerConfig;
use std::path::PathBuf;

/// pagestore - inspect and maintain a paged data file
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data file
    #[arg(short, long, default_value = "./pagestore.db")]
    file: PathBuf,

    /// Maximum number of cached pages
    #[arg(short, long, default_value = "256")]
    cache_size: usize,

    /// Open without write access
    #[arg(short, long)]
    read_only: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the data file if it does not exist
    Init,
    /// Allocate new pages
    Alloc {
        #[arg(short = 't', long = "type", value_enum, default_value = "data")]
        page_type: PageKind,
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
    /// Print a page header and part of its body
    Read {
        page_id: u64,
        #[arg(long, default_value = "0")]
        offset: usize,
        #[arg(long, default_value = "64")]
        len: usize,
    },
    /// Write text into a page body in one transaction
    Write {
        page_id: u64,
        offset: usize,
        text: String,
    },
    /// Deallocate a page
    Free { page_id: u64 },
    /// Check every allocated page against its on-disk checksum
    Verify,
    /// Replay the WAL and report what was redone
    Recover,
    /// Print pager statistics
    Stats,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PageKind {
    Data,
    Index,
    Metadata,
    Overflow,
}

impl From<PageKind> for PageType {
    fn from(kind: PageKind) -> Self {
        match kind {
            PageKind::Data => PageType::Data,
            PageKind::Index => PageType::Index,
            PageKind::Metadata => PageType::Metadata,
            PageKind::Overflow => PageType::Overflow,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = PagerConfig::new(&args.file)
        .with_cache_size(args.cache_size)
        .with_read_only(args.read_only);
    let pager = Pager::open(config)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    run(&pager, args.command)?;

    pager.close().context("Failed to close pager")?;
    Ok(())
}

fn run(pager: &Pager, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            println!("{}: {} pages", pager.config().file_path.display(), pager.page_count());
        }
        Command::Alloc { page_type, count } => {
            for _ in 0..count {
                let page = pager
                    .allocate_page(page_type.into())
                    .context("Failed to allocate page")?;
                println!("allocated {} page {}", page.page_type(), page.id());
            }
        }
        Command::Read {
            page_id,
            offset,
            len,
        } => {
            let page = pager
                .read_page(PageId(page_id))
                .with_context(|| format!("Failed to read page {}", page_id))?;
            let header = page.header();
            println!("page {} ({})", page.id(), page.page_type());
            println!("  records:    {}", header.record_count);
            println!("  free space: {}", header.free_space);
            println!("  next/prev:  {}/{}", header.next_page_id, header.prev_page_id);
            println!("  checksum:   {:#010x}", header.checksum);
            let bytes = page.read(offset, len).context("Invalid body range")?;
            print_hex(offset, bytes);
        }
        Command::Write {
            page_id,
            offset,
            text,
        } => {
            let mut txn = pager.begin().context("Failed to begin transaction")?;
            txn.write(PageId(page_id), offset, text.as_bytes())
                .with_context(|| format!("Failed to write page {}", page_id))?;
            let txn_id = txn.id();
            txn.commit().context("Failed to commit")?;
            println!("{} wrote {} bytes to page {}", txn_id, text.len(), page_id);
        }
        Command::Free { page_id } => {
            pager
                .deallocate_page(PageId(page_id))
                .with_context(|| format!("Failed to free page {}", page_id))?;
            println!("freed page {}", page_id);
        }
        Command::Verify => verify(pager)?,
        Command::Recover => {
            let stats = pager.recovery_stats();
            println!("entries replayed:      {}", stats.entries_replayed);
            println!("committed txns redone: {}", stats.committed_transactions);
            println!("discarded txns:        {}", stats.discarded_transactions);
            println!("writes applied:        {}", stats.writes_applied);
            println!("pages rebuilt:         {}", stats.pages_rebuilt);
        }
        Command::Stats => {
            let stats = pager.stats();
            println!("pages allocated: {}", stats.next_page_id.0 - 1);
            println!("free pages:      {}", stats.free_pages);
            println!("cached pages:    {}/{}", stats.cached_pages, stats.capacity);
            println!("dirty pages:     {}", stats.dirty_pages);
            println!(
                "cache:           {} hits, {} misses, {} evictions",
                stats.cache.hits, stats.cache.misses, stats.cache.evictions
            );
        }
    }
    Ok(())
}

fn verify(pager: &Pager) -> Result<()> {
    let mut corrupt = 0;
    for id in 1..=pager.page_count() {
        let page_id = PageId(id);
        if pager.is_free(page_id) {
            continue;
        }
        match pager.verify_page(page_id) {
            Ok(_) => {}
            Err(e) if e.is_corruption() => {
                println!("page {}: {}", page_id, e);
                corrupt += 1;
            }
            // Allocated but never flushed
            Err(StorageError::Io { .. }) => println!("page {}: not on disk yet", page_id),
            Err(e) => return Err(e).with_context(|| format!("Failed to verify page {}", page_id)),
        }
    }
    if corrupt > 0 {
        bail!("{} corrupt pages", corrupt);
    }
    println!("{} pages verified", pager.page_count());
    Ok(())
}

fn print_hex(base: usize, bytes: &[u8]) {
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect();
        println!("  {:04x}  {:<48} {}", base + i * 16, hex.join(" "), ascii);
    }
}
