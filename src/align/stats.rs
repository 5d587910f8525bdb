//! 种子管线的诊断统计。
//!
//! 每条 read 在四个阶段各取一次快照：计数过滤前、计数过滤后、
//! 位级匹配后、二次计数过滤后。输出两个 TSV 流：
//!
//! - `<prefix>_stats.tsv` — 每 read 每阶段一行，列出元区域被引用
//!   次数的直方图，稀疏表示为 `次数:元区域数` 对，次数在 400 处
//!   封顶；
//! - `<prefix>_counts.tsv` — 每 read 一行，四个阶段各自的种子总数。
//!
//! 两者纯诊断用途，不参与匹配正确性。

use std::collections::HashMap;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result};

use crate::index::RefIndex;

use super::seed::SeedLists;

/// 直方图封顶：引用次数超过此值的元区域归入最后一格。
pub const HIST_CAP: u32 = 400;

/// 管线阶段数：过滤前、计数过滤后、位匹配后、二次过滤后。
pub const LAYERS: usize = 4;

/// 一个阶段的快照。
#[derive(Debug, Clone, Default)]
pub struct LayerSnapshot {
    /// (引用次数, 该次数的元区域个数)，按次数升序。
    pub hist: Vec<(u32, u32)>,
    /// 阶段内幸存种子总数。
    pub total: u64,
}

/// 对当前种子列表做一次快照。
pub fn snapshot(idx: &RefIndex, lists: &SeedLists) -> LayerSnapshot {
    let mut refs: HashMap<usize, u32> = HashMap::new();
    for list in lists.fwd.iter().chain(lists.rev.iter()) {
        for hit in list {
            *refs.entry(idx.meta_slot(hit.entry)).or_insert(0) += 1;
        }
    }
    let mut hist: HashMap<u32, u32> = HashMap::new();
    for (_, n) in refs {
        *hist.entry(n.min(HIST_CAP)).or_insert(0) += 1;
    }
    let mut hist: Vec<(u32, u32)> = hist.into_iter().collect();
    hist.sort_unstable();
    LayerSnapshot {
        hist,
        total: lists.total_hits(),
    }
}

/// 两个统计流的写端，按 read 顺序由驱动线程串行写入。
pub struct StatsWriter {
    hist_w: BufWriter<std::fs::File>,
    counts_w: BufWriter<std::fs::File>,
}

impl StatsWriter {
    pub fn create(prefix: &str) -> Result<Self> {
        let hist_path = format!("{}_stats.tsv", prefix);
        let counts_path = format!("{}_counts.tsv", prefix);
        let hist_w = BufWriter::new(
            std::fs::File::create(&hist_path)
                .with_context(|| format!("failed to create '{}'", hist_path))?,
        );
        let counts_w = BufWriter::new(
            std::fs::File::create(&counts_path)
                .with_context(|| format!("failed to create '{}'", counts_path))?,
        );
        Ok(Self { hist_w, counts_w })
    }

    pub fn write_read(&mut self, id: &str, layers: &[LayerSnapshot]) -> Result<()> {
        for (li, layer) in layers.iter().enumerate() {
            write!(self.hist_w, "{}\t{}", id, li)?;
            for &(n, regions) in &layer.hist {
                write!(self.hist_w, "\t{}:{}", n, regions)?;
            }
            writeln!(self.hist_w)?;
        }
        write!(self.counts_w, "{}", id)?;
        for layer in layers {
            write!(self.counts_w, "\t{}", layer.total)?;
        }
        writeln!(self.counts_w)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.hist_w.flush()?;
        self.counts_w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::seed::{SeedHit, SeedLists};
    use crate::index::{IndexParams, KmerEntry, RefIndex};

    fn toy_index() -> RefIndex {
        let p = IndexParams {
            kmer_len: 8,
            read_len: 12,
            table_bits: 10,
            kmer_cutoff: 1000,
            lossless: false,
        };
        let seq = b"TTAGGCATTACGATTGGCCATTAACGGTTACATTGGATCC".to_vec();
        RefIndex::build(vec![("chr1".to_string(), seq)], p).unwrap()
    }

    #[test]
    fn snapshot_counts_references_per_region() {
        let idx = toy_index();
        let hit = |meta: usize| SeedHit {
            entry: KmerEntry::new(meta, 0, false),
            fwd_ref: true,
        };
        // 元区域 0 被引用 3 次，区域 "start 0" 被引用 1 次
        let lists = SeedLists {
            fwd: vec![vec![hit(0), hit(0)], vec![hit(0)]],
            rev: vec![vec![SeedHit {
                entry: KmerEntry::new(0, 0, true),
                fwd_ref: false,
            }]],
        };
        let snap = snapshot(&idx, &lists);
        assert_eq!(snap.total, 4);
        assert_eq!(snap.hist, vec![(1, 1), (3, 1)]);
    }

    #[test]
    fn histogram_caps_reference_counts() {
        let idx = toy_index();
        let hit = SeedHit {
            entry: KmerEntry::new(0, 0, false),
            fwd_ref: true,
        };
        let lists = SeedLists {
            fwd: vec![vec![hit; 450]],
            rev: vec![],
        };
        let snap = snapshot(&idx, &lists);
        assert_eq!(snap.hist, vec![(HIST_CAP, 1)]);
    }
}
