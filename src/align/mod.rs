//! read 匹配管线。
//!
//! 单条 read 的处理顺序：查表取种子 -> 计数启发式过滤 -> 位级精确
//! 验证 -> 二次计数过滤 -> 解析为 (染色体, 位置, 方向) 候选集。
//! 块内 read 之间彼此独立并行，索引结构全程只读，每个工作线程
//! 持有自己的计数现场。

use std::fmt;
use std::io::{BufReader, Write};

use anyhow::{Context, Result};
use log::info;
use rayon::prelude::*;

use crate::index::RefIndex;
use crate::io::fastq::FastqChunkReader;

pub mod bitmatch;
pub mod seed;
pub mod stats;

use seed::{Scratch, SeedLists};
use stats::{LayerSnapshot, StatsWriter};

/// read 相对参考正链的匹配方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Forward => write!(f, "+"),
            Strand::Reverse => write!(f, "-"),
        }
    }
}

/// 一个通过全部过滤的候选位置：read 起点在染色体上的 0 基坐标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Candidate {
    pub chrom: u32,
    pub pos: u32,
    pub strand: Strand,
}

/// 匹配阶段的运行参数。
#[derive(Debug, Clone)]
pub struct MatchOpt {
    pub threads: usize,
    pub chunk_size: usize,
    /// 计数启发式容忍的错配碱基数。
    pub miscount: u32,
    /// 给定时写出种子统计 TSV。
    pub stats_prefix: Option<String>,
}

impl Default for MatchOpt {
    fn default() -> Self {
        Self {
            threads: 1,
            chunk_size: 100_000,
            miscount: 2,
            stats_prefix: None,
        }
    }
}

/// 对一条 read 走完整个匹配管线。
///
/// `collect_stats` 打开时额外返回四个阶段的统计快照。
pub fn match_read(
    idx: &RefIndex,
    read: &[u8],
    miscount: u32,
    scratch: &mut Scratch,
    collect_stats: bool,
) -> (Vec<Candidate>, Option<Vec<LayerSnapshot>>) {
    let l = read.len();
    let mut lists = seed::get_seeds(idx, read);
    let mut layers = if collect_stats { Some(Vec::with_capacity(stats::LAYERS)) } else { None };
    if let Some(ls) = &mut layers {
        ls.push(stats::snapshot(idx, &lists));
    }

    seed::filter_heu_seeds(idx, &mut lists.fwd, l, miscount, scratch);
    seed::filter_heu_seeds(idx, &mut lists.rev, l, miscount, scratch);
    if let Some(ls) = &mut layers {
        ls.push(stats::snapshot(idx, &lists));
    }

    bitmatch::bit_matching(idx, read, &mut lists.fwd);
    bitmatch::bit_matching_rev(idx, read, &mut lists.rev);
    if let Some(ls) = &mut layers {
        ls.push(stats::snapshot(idx, &lists));
    }

    seed::filter_heu_seeds(idx, &mut lists.fwd, l, miscount, scratch);
    seed::filter_heu_seeds(idx, &mut lists.rev, l, miscount, scratch);
    if let Some(ls) = &mut layers {
        ls.push(stats::snapshot(idx, &lists));
    }

    (collect_candidates(idx, &lists, l), layers)
}

/// 把幸存种子解析为候选位置并去重。
///
/// 四种 (扫描方向, 条目链方向) 组合各自决定候选方向与 read 起点：
/// 正向扫描正链条目意味着 read 以正向贴在 k-mer 起点左移 o 处，
/// 其余组合按反向互补几何对称推出。同一位置经多个窗口或两种表示
/// 重复出现时只留一份。
pub fn collect_candidates(idx: &RefIndex, lists: &SeedLists, read_len: usize) -> Vec<Candidate> {
    let k = idx.params.kmer_len;
    let l = read_len as u32;
    let mut out = Vec::new();

    let mut push = |chrom: usize, start: Option<u32>, strand: Strand| {
        let Some(s) = start else { return };
        if s + l > idx.strands[chrom].len() {
            return;
        }
        out.push(Candidate { chrom: chrom as u32, pos: s, strand });
    };

    for (o, list) in lists.fwd.iter().enumerate() {
        let o = o as u32;
        for hit in list {
            let (chrom, base) = idx.kmer_origin(hit.entry);
            let p = base + hit.entry.offset();
            if hit.fwd_ref {
                push(chrom, p.checked_sub(o), Strand::Forward);
            } else {
                push(chrom, (p + k + o).checked_sub(l), Strand::Reverse);
            }
        }
    }
    for (j, list) in lists.rev.iter().enumerate() {
        let j = j as u32;
        for hit in list {
            let (chrom, base) = idx.kmer_origin(hit.entry);
            let p = base + hit.entry.offset();
            if hit.fwd_ref {
                push(chrom, p.checked_sub(j), Strand::Reverse);
            } else {
                push(chrom, (p + k + j).checked_sub(l), Strand::Forward);
            }
        }
    }

    out.sort_unstable();
    out.dedup();
    out
}

/// 加载索引、分块读 FASTQ 并行匹配、写出候选 TSV。
///
/// 输出每行为 `read_id  染色体名  0基位置  方向`；无候选的 read 输出
/// `read_id  *`。
pub fn run_match(
    index_path: &str,
    reads_path: &str,
    out_path: Option<&str>,
    opt: &MatchOpt,
) -> Result<()> {
    let idx = RefIndex::load_from_file(index_path)?;
    info!(
        "loaded index: {} chromosomes, {} meta regions, {} table entries",
        idx.chroms.len(),
        idx.meta_slots(),
        idx.kmer_table.len()
    );

    let f = std::fs::File::open(reads_path)
        .with_context(|| format!("failed to open reads '{}'", reads_path))?;
    let mut reader = FastqChunkReader::new(BufReader::new(f));

    let mut out: Box<dyn Write> = if let Some(p) = out_path {
        Box::new(std::io::BufWriter::new(
            std::fs::File::create(p).with_context(|| format!("failed to create '{}'", p))?,
        ))
    } else {
        Box::new(std::io::BufWriter::new(std::io::stdout()))
    };
    let mut stats_w = match opt.stats_prefix.as_deref() {
        Some(prefix) => Some(StatsWriter::create(prefix)?),
        None => None,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opt.threads)
        .build()
        .context("failed to build worker thread pool")?;

    let collect_stats = stats_w.is_some();
    let miscount = opt.miscount;
    let mut chunk = Vec::new();
    let mut total = 0u64;
    let mut matched = 0u64;
    loop {
        let more = reader.fill_chunk(&mut chunk, opt.chunk_size)?;
        if !chunk.is_empty() {
            let results: Vec<(Vec<Candidate>, Option<Vec<LayerSnapshot>>)> = pool.install(|| {
                chunk
                    .par_iter()
                    .map_init(
                        || Scratch::new(idx.meta_slots()),
                        |scratch, rec| match_read(&idx, &rec.seq, miscount, scratch, collect_stats),
                    )
                    .collect()
            });

            for (rec, (cands, layers)) in chunk.iter().zip(&results) {
                total += 1;
                if cands.is_empty() {
                    writeln!(out, "{}\t*", rec.id)?;
                } else {
                    matched += 1;
                    for c in cands {
                        writeln!(
                            out,
                            "{}\t{}\t{}\t{}",
                            rec.id,
                            idx.chroms[c.chrom as usize].name,
                            c.pos,
                            c.strand
                        )?;
                    }
                }
                if let (Some(w), Some(layers)) = (&mut stats_w, layers) {
                    w.write_read(&rec.id, layers)?;
                }
            }
            info!("chunk of {} reads done", chunk.len());
        }
        if !more {
            break;
        }
    }
    out.flush()?;
    if let Some(w) = &mut stats_w {
        w.flush()?;
    }
    info!(
        "processed {} reads, {} matched, {} malformed records skipped",
        total,
        matched,
        reader.skipped()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexParams, RefIndex};
    use crate::util::dna;

    // 40 碱基玩具参考：CpG 在 18 与 28，相距 10
    const TOY: &[u8] = b"GAATTGAGTAGAGGATTACGTAGGATAGCGTTAGAAGGTA";

    fn toy_index(kmer_len: u32) -> RefIndex {
        let p = IndexParams {
            kmer_len,
            read_len: 20,
            table_bits: 12,
            kmer_cutoff: 1000,
            lossless: false,
        };
        RefIndex::build(vec![("chr1".to_string(), TOY.to_vec())], p).unwrap()
    }

    fn run(idx: &RefIndex, read: &[u8], miscount: u32) -> Vec<Candidate> {
        let mut scratch = Scratch::new(idx.meta_slots());
        match_read(idx, read, miscount, &mut scratch, false).0
    }

    #[test]
    fn exact_read_maps_to_its_origin_only() {
        let idx = toy_index(20);
        let read = &TOY[5..25];
        let cands = run(&idx, read, 0);
        assert_eq!(
            cands,
            vec![Candidate { chrom: 0, pos: 5, strand: Strand::Forward }]
        );
    }

    #[test]
    fn one_mismatch_within_allowance_still_maps() {
        let idx = toy_index(8);
        let mut read = TOY[5..25].to_vec();
        read[3] = b'A'; // 原为 T
        let cands = run(&idx, &read, 1);
        assert_eq!(
            cands,
            vec![Candidate { chrom: 0, pos: 5, strand: Strand::Forward }]
        );
    }

    #[test]
    fn too_many_mismatches_yield_nothing() {
        // 三个错配铺满所有窗口：启发式可能放行，但位级比较全部拒绝
        let idx = toy_index(8);
        let mut read = TOY[5..25].to_vec();
        read[2] = b'T'; // 原为 G
        read[9] = b'C'; // 原为 A
        read[16] = b'G'; // 原为 A
        let cands = run(&idx, &read, 1);
        assert!(cands.is_empty());
    }

    #[test]
    fn reverse_complement_read_recovers_same_position() {
        let idx = toy_index(8);
        let read = &TOY[5..25];
        let rc = dna::revcomp(read);

        let fwd_cands = run(&idx, read, 0);
        let rc_cands = run(&idx, &rc, 0);
        assert_eq!(fwd_cands.len(), 1);
        assert_eq!(rc_cands.len(), 1);
        assert_eq!(fwd_cands[0].pos, rc_cands[0].pos);
        assert_eq!(fwd_cands[0].strand, Strand::Forward);
        assert_eq!(rc_cands[0].strand, Strand::Reverse);
    }

    #[test]
    fn bisulfite_converted_read_maps_home() {
        let idx = toy_index(8);
        // 参考里的 C 在 read 中全部转化为 T
        let read: Vec<u8> = TOY[5..25]
            .iter()
            .map(|&b| if b == b'C' { b'T' } else { b })
            .collect();
        let cands = run(&idx, &read, 0);
        assert_eq!(
            cands,
            vec![Candidate { chrom: 0, pos: 5, strand: Strand::Forward }]
        );
    }

    #[test]
    fn short_read_produces_empty_candidate_set() {
        let idx = toy_index(8);
        assert!(run(&idx, b"ACGT", 0).is_empty());
    }

    #[test]
    fn unrelated_read_produces_no_candidates() {
        let idx = toy_index(8);
        let read = b"ACACACACACACACACACAC";
        assert!(run(&idx, read, 2).is_empty());
    }

    #[test]
    fn stats_snapshots_cover_all_four_layers() {
        let idx = toy_index(8);
        let mut scratch = Scratch::new(idx.meta_slots());
        let (_, layers) = match_read(&idx, &TOY[5..25], 0, &mut scratch, true);
        let layers = layers.unwrap();
        assert_eq!(layers.len(), stats::LAYERS);
        // 各阶段只减不增
        for w in layers.windows(2) {
            assert!(w[1].total <= w[0].total);
        }
    }
}
