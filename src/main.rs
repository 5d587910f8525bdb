use anyhow::Result;
use clap::{Parser, Subcommand};

use bsalign_rust::align::{self, MatchOpt};
use bsalign_rust::index::{IndexMeta, IndexParams, RefIndex};
use bsalign_rust::io::fasta;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "bsalign-rust",
    author,
    version,
    about = "Bisulfite-sequencing read aligner over a CpG-anchored k-mer index",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose progress logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the CpG-anchored k-mer index of a reference FASTA
    Index {
        /// Reference FASTA file
        reference: String,
        /// Output prefix for the index file
        #[arg(short, long, default_value = "ref")]
        output: String,
        #[arg(short = 'k', long = "kmer-len", default_value_t = 20)]
        kmer_len: u32,
        /// Expected read length (sizes the CpG flanking windows)
        #[arg(short = 'r', long = "read-len", default_value_t = 100)]
        read_len: u32,
        /// log2 of the hash bucket count
        #[arg(long = "table-bits", default_value_t = 26)]
        table_bits: u32,
        /// Blacklist k-mers occurring more often than this
        #[arg(long = "cutoff", default_value_t = 1500)]
        cutoff: u32,
        /// Retain normalized sequences inside the index
        #[arg(long)]
        lossless: bool,
    },
    /// Match FASTQ reads against a built index
    Match {
        /// Path to the index file (.bsidx)
        #[arg(short = 'i', long = "index")]
        index: String,
        /// Reads FASTQ file
        reads: String,
        /// Output TSV path (stdout if omitted)
        #[arg(short, long)]
        out: Option<String>,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
        /// Reads per parallel chunk
        #[arg(long = "chunk-size", default_value_t = 100_000)]
        chunk_size: usize,
        /// Mismatch allowance for the counting heuristic
        #[arg(long = "miscount", default_value_t = 2)]
        miscount: u32,
        /// Prefix for the two seed-statistics TSV files
        #[arg(long = "stats")]
        stats: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .init();

    match cli.command {
        Commands::Index {
            reference,
            output,
            kmer_len,
            read_len,
            table_bits,
            cutoff,
            lossless,
        } => {
            let params = IndexParams {
                kmer_len,
                read_len,
                table_bits,
                kmer_cutoff: cutoff,
                lossless,
            };
            run_index(&reference, &output, params)
        }
        Commands::Match {
            index,
            reads,
            out,
            threads,
            chunk_size,
            miscount,
            stats,
        } => {
            let opt = MatchOpt {
                threads,
                chunk_size,
                miscount,
                stats_prefix: stats,
            };
            align::run_match(&index, &reads, out.as_deref(), &opt)
        }
    }
}

fn run_index(reference: &str, output: &str, params: IndexParams) -> Result<()> {
    let seqs = fasta::read_reference(reference)?;
    if seqs.is_empty() {
        anyhow::bail!("FASTA file '{}' contains no sequences", reference);
    }
    let n_seqs = seqs.len();
    let total_len: usize = seqs.iter().map(|(_, s)| s.len()).sum();
    println!("reference: {}", reference);
    println!("sequences: {}", n_seqs);
    println!("total_len: {}", total_len);

    let mut idx = RefIndex::build(seqs, params)?;
    idx.set_meta(IndexMeta {
        reference_file: Some(reference.to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    });

    println!("meta_regions: {}", idx.meta_slots());
    println!("table_entries: {}", idx.kmer_table.len());
    println!("blacklisted: {}", idx.blacklist.len());

    let out_path = format!("{}.bsidx", output);
    idx.save_to_file(&out_path)?;
    println!("index saved: {}", out_path);
    Ok(())
}
