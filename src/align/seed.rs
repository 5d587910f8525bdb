//! 种子检索与计数启发式过滤。
//!
//! 对长度 L 的 read 生成 n = L - K + 1 个 k-mer 窗口，正向与反向
//! 互补读法各一组按偏移索引的种子列表。列表直接拷贝整个哈希桶：
//! 桶内可能混有哈希碰撞的其他 k-mer，由后续位级精确比较剔除。

use crate::index::{KmerEntry, RefIndex};
use crate::index::hash::RollHash;
use crate::util::dna;

/// 一个候选种子：哈希表条目加其链方向标志。
#[derive(Debug, Clone, Copy)]
pub struct SeedHit {
    pub entry: KmerEntry,
    /// true 表示条目对应参考正链读法的 k-mer。
    pub fwd_ref: bool,
}

/// 一条 read 的全部种子列表。
///
/// `fwd[o]` 为 read 正向第 o 个 k-mer 的命中；`rev[j]` 为 read 反向
/// 互补序列第 j 个 k-mer 的命中（j 按反向互补序列自左向右计）。
#[derive(Debug, Default)]
pub struct SeedLists {
    pub fwd: Vec<Vec<SeedHit>>,
    pub rev: Vec<Vec<SeedHit>>,
}

impl SeedLists {
    pub fn total_hits(&self) -> u64 {
        let f: usize = self.fwd.iter().map(Vec::len).sum();
        let r: usize = self.rev.iter().map(Vec::len).sum();
        (f + r) as u64
    }
}

/// 每线程一份的启发式过滤现场，按元区域总数分配一次，整个 run 复用。
#[derive(Debug)]
pub struct Scratch {
    counts: Vec<u32>,
    touched: Vec<usize>,
}

impl Scratch {
    pub fn new(meta_slots: usize) -> Self {
        Self {
            counts: vec![0; meta_slots],
            touched: Vec::new(),
        }
    }

    fn reset(&mut self) {
        for &m in &self.touched {
            self.counts[m] = 0;
        }
        self.touched.clear();
    }
}

/// 查表生成 read 的种子列表。
///
/// read 短于一个 k-mer 时返回空列表集。归约 k-mer 落在黑名单中的
/// 窗口直接跳过，不产出命中。
pub fn get_seeds(idx: &RefIndex, read: &[u8]) -> SeedLists {
    let k = idx.params.kmer_len as usize;
    let l = read.len();
    if l < k {
        return SeedLists::default();
    }
    let n = l - k + 1;
    let mut fwd = vec![Vec::new(); n];
    let mut rev = vec![Vec::new(); n];

    let signi = u64::MAX >> (64 - 2 * k);
    let mut h = RollHash::init(k, read[..k].iter().map(|&b| dna::base_code(b)));
    // 正向与反向互补窗口的归约位串，用于黑名单查询
    let mut fwd_bits = 0u64;
    let mut rc_bits = 0u64;
    for i in 0..k {
        fwd_bits = (fwd_bits << 2) | dna::match_code(read[i]);
        rc_bits |= dna::match_code_rc(read[i]) << (2 * i);
    }

    for o in 0..n {
        if o > 0 {
            h.roll(dna::base_code(read[o - 1]), dna::base_code(read[o + k - 1]));
            fwd_bits = ((fwd_bits << 2) | dna::match_code(read[o + k - 1])) & signi;
            rc_bits = (rc_bits >> 2) | (dna::match_code_rc(read[o + k - 1]) << (2 * (k - 1)));
        }
        if !idx.blacklist.contains(&fwd_bits) {
            let (entries, strands) = idx.bucket_slice(idx.bucket_of(h.fwd()));
            fwd[o] = entries
                .iter()
                .zip(strands)
                .map(|(&entry, &fwd_ref)| SeedHit { entry, fwd_ref })
                .collect();
        }
        if !idx.blacklist.contains(&rc_bits) {
            let (entries, strands) = idx.bucket_slice(idx.bucket_of(h.rc()));
            rev[n - 1 - o] = entries
                .iter()
                .zip(strands)
                .map(|(&entry, &fwd_ref)| SeedHit { entry, fwd_ref })
                .collect();
        }
    }

    SeedLists { fwd, rev }
}

/// 计数启发式：元区域被多少个不同偏移的窗口命中。
///
/// 阈值为 `L - K + 1 - K*miscount`：read 的窗口总数减去 miscount 个
/// 错配各自最多破坏 K 个窗口的容限。同一偏移对同一元区域只计一次
/// （桶内同元区域的条目连续，见构建顺序），未达阈值的元区域的全部
/// 命中被丢弃。阈值不为正时过滤退化为全保留。
pub fn filter_heu_seeds(
    idx: &RefIndex,
    lists: &mut [Vec<SeedHit>],
    read_len: usize,
    miscount: u32,
    scratch: &mut Scratch,
) {
    let k = idx.params.kmer_len as usize;
    if read_len < k {
        return;
    }
    let windows = (read_len - k + 1) as u32;
    let cut = windows.saturating_sub(k as u32 * miscount);
    if cut <= 1 {
        return;
    }

    scratch.reset();
    for list in lists.iter() {
        let mut last = usize::MAX;
        for hit in list {
            let m = idx.meta_slot(hit.entry);
            if m != last {
                if scratch.counts[m] == 0 {
                    scratch.touched.push(m);
                }
                scratch.counts[m] += 1;
                last = m;
            }
        }
    }
    for list in lists.iter_mut() {
        list.retain(|hit| scratch.counts[idx.meta_slot(hit.entry)] >= cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexParams, RefIndex};

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

    fn hit(meta: usize) -> SeedHit {
        SeedHit {
            entry: KmerEntry::new(meta, 0, false),
            fwd_ref: true,
        }
    }

    #[test]
    fn short_read_yields_empty_lists() {
        let idx = toy_index();
        let lists = get_seeds(&idx, b"ACGT");
        assert!(lists.fwd.is_empty());
        assert!(lists.rev.is_empty());
    }

    #[test]
    fn seed_lists_cover_every_offset() {
        let idx = toy_index();
        let read = b"TTACGATTGGCC"; // 取自参考序列
        let lists = get_seeds(&idx, read);
        let n = read.len() - idx.params.kmer_len as usize + 1;
        assert_eq!(lists.fwd.len(), n);
        assert_eq!(lists.rev.len(), n);
        assert!(lists.total_hits() > 0);
    }

    #[test]
    fn heuristic_threshold_is_exact() {
        // L=12, K=8, miscount=0 -> 阈值 = 5
        let idx = toy_index();
        let read_len = 12usize;
        let n = read_len - 8 + 1;
        let mut scratch = Scratch::new(idx.meta_slots());

        // 元区域 0 在 4 个偏移有支持：差一票，应被整体剔除
        let mut lists: Vec<Vec<SeedHit>> = vec![Vec::new(); n];
        for o in 0..4 {
            lists[o].push(hit(0));
        }
        filter_heu_seeds(&idx, &mut lists, read_len, 0, &mut scratch);
        assert!(lists.iter().all(Vec::is_empty));

        // 5 个偏移：恰好达到阈值，全部保留
        let mut lists: Vec<Vec<SeedHit>> = vec![Vec::new(); n];
        for o in 0..5 {
            lists[o].push(hit(0));
        }
        filter_heu_seeds(&idx, &mut lists, read_len, 0, &mut scratch);
        assert_eq!(lists.iter().filter(|l| !l.is_empty()).count(), 5);
    }

    #[test]
    fn same_offset_counts_a_region_once() {
        let idx = toy_index();
        let read_len = 12usize;
        let n = read_len - 8 + 1;
        let mut scratch = Scratch::new(idx.meta_slots());

        // 单个偏移塞 5 份同元区域的命中：计数仍为 1，达不到阈值
        let mut lists: Vec<Vec<SeedHit>> = vec![Vec::new(); n];
        for _ in 0..5 {
            lists[0].push(hit(0));
        }
        filter_heu_seeds(&idx, &mut lists, read_len, 0, &mut scratch);
        assert!(lists[0].is_empty());
    }

    #[test]
    fn zero_threshold_keeps_everything() {
        // miscount 大到阈值饱和为 0：过滤为恒等
        let idx = toy_index();
        let mut lists: Vec<Vec<SeedHit>> = vec![vec![hit(0)]];
        let mut scratch = Scratch::new(idx.meta_slots());
        filter_heu_seeds(&idx, &mut lists, 12, 10, &mut scratch);
        assert_eq!(lists[0].len(), 1);
    }
}
