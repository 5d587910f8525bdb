//! 两遍法构建 k-mer 哈希表。
//!
//! 第一遍只统计每个桶的条目数，第二遍按前缀和精确分配并填充，
//! 避免在可能数亿条目的结构上反复扩容拷贝。两遍共用同一个元区域
//! 遍历器，保证桶计数与写入一一对应；填充越过预留区间视为内部
//! 一致性错误，构建立即中止。

use std::collections::HashMap;

use anyhow::{bail, Result};
use log::info;
use rayon::prelude::*;

use crate::util::dna;

use super::bitseq::PackedStrand;
use super::cpg::{self, CpgTables};
use super::hash::RollHash;
use super::{Chromosome, IndexMeta, IndexParams, KmerEntry, KmerSet, RefIndex};

impl RefIndex {
    /// 从 (染色体名, 序列) 列表构建完整索引。
    ///
    /// 返回的索引已经做完黑名单与冗余过滤，可直接用于匹配或持久化。
    pub fn build(seqs: Vec<(String, Vec<u8>)>, params: IndexParams) -> Result<RefIndex> {
        check_params(&params)?;
        if seqs.is_empty() {
            bail!("reference contains no sequences");
        }
        if seqs.len() > u8::MAX as usize + 1 {
            bail!("reference has {} sequences, at most 256 supported", seqs.len());
        }

        let mut chroms = Vec::with_capacity(seqs.len());
        let mut norm: Vec<Vec<u8>> = Vec::with_capacity(seqs.len());
        for (name, seq) in seqs {
            if seq.len() > u32::MAX as usize {
                bail!("sequence '{}' exceeds the 32-bit position space", name);
            }
            chroms.push(Chromosome { name, len: seq.len() as u32 });
            norm.push(dna::normalize_seq(&seq));
        }

        let tables = cpg::group(&norm, params.read_len);
        info!(
            "located {} CpGs ({} near origin), {} meta regions ({} start)",
            tables.cpg.len(),
            tables.cpg_start.len(),
            tables.meta.len(),
            tables.meta_start.len()
        );

        let strands: Vec<PackedStrand> = norm.par_iter().map(|s| PackedStrand::pack(s)).collect();

        // 第一遍：桶占用统计
        let bucket_count = 1usize << params.table_bits;
        let mask = bucket_count as u64 - 1;
        let mut occupancy = vec![0u32; bucket_count];
        for_each_region_kmer(&tables, &strands, &params, |_, _, fh, rh, _| {
            occupancy[(fh & mask) as usize] += 1;
            occupancy[(rh & mask) as usize] += 1;
            Ok(())
        })?;

        let mut tab_index = Vec::with_capacity(bucket_count + 1);
        let mut acc = 0u64;
        for &c in &occupancy {
            tab_index.push(acc);
            acc += c as u64;
        }
        tab_index.push(acc);
        info!("hash table sized: {} entries across {} buckets", acc, bucket_count);

        // 第二遍：精确填充，游标越界即中止
        let total = acc as usize;
        let mut kmer_table = vec![KmerEntry::default(); total];
        let mut strand_table = vec![false; total];
        let mut next = tab_index[..bucket_count].to_vec();
        for_each_region_kmer(&tables, &strands, &params, |meta, is_start, fh, rh, off| {
            let e = KmerEntry::new(meta, off as u16, is_start);
            for (h, fwd) in [(fh, true), (rh, false)] {
                let b = (h & mask) as usize;
                let slot = next[b];
                if slot >= tab_index[b + 1] {
                    bail!(
                        "bucket {} overflows its reserved range during fill; \
                         sizing and fill passes disagree",
                        b
                    );
                }
                kmer_table[slot as usize] = e;
                strand_table[slot as usize] = fwd;
                next[b] = slot + 1;
            }
            Ok(())
        })?;
        for b in 0..bucket_count {
            if next[b] != tab_index[b + 1] {
                bail!("bucket {} underfilled; sizing and fill passes disagree", b);
            }
        }

        let full_seq = params.lossless.then_some(norm);
        let mut idx = RefIndex {
            params,
            meta_info: IndexMeta::default(),
            chroms,
            cpg: tables.cpg,
            cpg_start: tables.cpg_start,
            meta: tables.meta,
            meta_start: tables.meta_start,
            strands,
            tab_index,
            kmer_table,
            strand_table,
            blacklist: KmerSet::default(),
            full_seq,
        };

        idx.blacklist_frequent();
        idx.filter_redundant();
        Ok(idx)
    }

    /// 由基因组位串重现条目的归约 k-mer 序列。
    ///
    /// 条目本身只存元区域与偏移；位置经元区域和 CpG 表解析后从
    /// 打包正链抽取（按链方向取正向或反向互补），再折叠 C->T。
    pub fn reproduce_kmer(&self, e: KmerEntry, fwd: bool) -> u64 {
        let k = self.params.kmer_len as usize;
        let (chrom, base) = self.kmer_origin(e);
        let p = base + e.offset();
        let bits = if fwd {
            self.strands[chrom].kmer(p, k)
        } else {
            self.strands[chrom].kmer_revcomp(p, k)
        };
        dna::reduce_bits(bits)
    }

    /// 黑名单化基因组内出现次数超过截断值的 k-mer 并重建哈希表。
    ///
    /// 同一 k-mer 的全部出现都落在同一个桶里，因此只需检查占用
    /// 超过截断值的桶。被黑名单命中的条目从表中物理移除。
    fn blacklist_frequent(&mut self) {
        let cutoff = self.params.kmer_cutoff;
        let mut occ: HashMap<u64, u32> = HashMap::new();
        for b in 0..self.bucket_count() {
            let lo = self.tab_index[b] as usize;
            let hi = self.tab_index[b + 1] as usize;
            if (hi - lo) as u32 <= cutoff {
                continue;
            }
            occ.clear();
            for i in lo..hi {
                let seq = self.reproduce_kmer(self.kmer_table[i], self.strand_table[i]);
                *occ.entry(seq).or_insert(0) += 1;
            }
            for (&seq, &n) in &occ {
                if n > cutoff {
                    self.blacklist.insert(seq);
                }
            }
        }
        if self.blacklist.is_empty() {
            return;
        }

        let mut keep = vec![true; self.kmer_table.len()];
        for b in 0..self.bucket_count() {
            let lo = self.tab_index[b] as usize;
            let hi = self.tab_index[b + 1] as usize;
            // 占用不超截断值的桶不可能含黑名单 k-mer
            if (hi - lo) as u32 <= cutoff {
                continue;
            }
            for i in lo..hi {
                let seq = self.reproduce_kmer(self.kmer_table[i], self.strand_table[i]);
                keep[i] = !self.blacklist.contains(&seq);
            }
        }
        let dropped = keep.iter().filter(|&&k| !k).count();
        info!(
            "blacklisted {} k-mers, dropping {} table entries",
            self.blacklist.len(),
            dropped
        );
        self.compact_table(&keep);
    }

    /// 同一 (k-mer, 元区域) 至多保留一个条目。
    ///
    /// 元区域内重复出现的 k-mer 会在计数启发式里自我加强，保留
    /// 一个代表即可。
    fn filter_redundant(&mut self) {
        let mut keep = vec![true; self.kmer_table.len()];
        let mut seen: HashMap<(u64, usize), ()> = HashMap::new();
        let mut dropped = 0usize;
        for b in 0..self.bucket_count() {
            let lo = self.tab_index[b] as usize;
            let hi = self.tab_index[b + 1] as usize;
            if hi - lo < 2 {
                continue;
            }
            seen.clear();
            for i in lo..hi {
                let e = self.kmer_table[i];
                let seq = self.reproduce_kmer(e, self.strand_table[i]);
                if seen.insert((seq, self.meta_slot(e)), ()).is_some() {
                    keep[i] = false;
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            info!("dropped {} redundant entries within meta regions", dropped);
            self.compact_table(&keep);
        }
    }

    /// 按保留标志重建 `kmer_table`/`strand_table` 并重算 `tab_index`，
    /// 桶内顺序保持不变。
    fn compact_table(&mut self, keep: &[bool]) {
        let bc = self.bucket_count();
        let kept = keep.iter().filter(|&&k| k).count();
        let mut new_tab = Vec::with_capacity(bc + 1);
        let mut new_kmers = Vec::with_capacity(kept);
        let mut new_strands = Vec::with_capacity(kept);
        for b in 0..bc {
            new_tab.push(new_kmers.len() as u64);
            let lo = self.tab_index[b] as usize;
            let hi = self.tab_index[b + 1] as usize;
            for i in lo..hi {
                if keep[i] {
                    new_kmers.push(self.kmer_table[i]);
                    new_strands.push(self.strand_table[i]);
                }
            }
        }
        new_tab.push(new_kmers.len() as u64);
        self.tab_index = new_tab;
        self.kmer_table = new_kmers;
        self.strand_table = new_strands;
    }
}

fn check_params(p: &IndexParams) -> Result<()> {
    if p.kmer_len < 1 || p.kmer_len > 32 {
        bail!("k-mer length {} outside supported range 1..=32", p.kmer_len);
    }
    if p.read_len < p.kmer_len || p.read_len < 2 {
        bail!(
            "read length {} must be at least the k-mer length {}",
            p.read_len,
            p.kmer_len
        );
    }
    // 窗口长度 2*read_len - 2 必须放得进 16-bit 偏移字段
    if p.read_len > (u16::MAX as u32 + 2) / 2 {
        bail!("read length {} exceeds the offset field capacity", p.read_len);
    }
    if p.table_bits < 1 || p.table_bits > 32 {
        bail!("table bits {} outside supported range 1..=32", p.table_bits);
    }
    Ok(())
}

/// 依次遍历每个元区域覆盖的序列窗口里的所有 k-mer。
///
/// 两遍构建都走这一条路径，回调依次收到元区域编号、是否起始区域、
/// 正向/反向互补哈希与窗口内偏移。窗口短于 k 的元区域不产出任何
/// k-mer；起始区域的窗口从位置 0 开始，绝不读取序列起点之前。
fn for_each_region_kmer<F>(
    tables: &CpgTables,
    strands: &[PackedStrand],
    params: &IndexParams,
    mut f: F,
) -> Result<()>
where
    F: FnMut(usize, bool, u64, u64, u32) -> Result<()>,
{
    let k = params.kmer_len as usize;
    let win = cpg::window_len(params.read_len);

    for (mi, m) in tables.meta.iter().enumerate() {
        let first = tables.cpg[m.start as usize];
        let last = tables.cpg[m.end as usize - 1];
        let strand = &strands[first.chrom as usize];
        let end = last.pos.saturating_add(win).min(strand.len());
        walk_window(strand, first.pos, end, k, |fh, rh, off| f(mi, false, fh, rh, off))?;
    }
    for (mi, m) in tables.meta_start.iter().enumerate() {
        let last = tables.cpg_start[m.end as usize - 1];
        let strand = &strands[last.chrom as usize];
        let end = last.pos.saturating_add(params.read_len).min(strand.len());
        walk_window(strand, 0, end, k, |fh, rh, off| f(mi, true, fh, rh, off))?;
    }
    Ok(())
}

/// 在 `[begin, end)` 窗口上滚动哈希每个 k-mer。
fn walk_window<F>(strand: &PackedStrand, begin: u32, end: u32, k: usize, mut f: F) -> Result<()>
where
    F: FnMut(u64, u64, u32) -> Result<()>,
{
    if end <= begin || ((end - begin) as usize) < k {
        return Ok(());
    }
    let kk = k as u32;
    let mut h = RollHash::init(k, (begin..begin + kk).map(|p| strand.code_at(p)));
    f(h.fwd(), h.rc(), 0)?;
    for q in begin + 1..=end - kk {
        h.roll(strand.code_at(q - 1), strand.code_at(q + kk - 1));
        f(h.fwd(), h.rc(), q - begin)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::dna;

    fn params(k: u32, rl: u32, cutoff: u32) -> IndexParams {
        IndexParams {
            kmer_len: k,
            read_len: rl,
            table_bits: 10,
            kmer_cutoff: cutoff,
            lossless: false,
        }
    }

    fn build_one(seq: &[u8], p: IndexParams) -> RefIndex {
        RefIndex::build(vec![("chr1".to_string(), seq.to_vec())], p).unwrap()
    }

    /// 序列的归约位串（与 reproduce_kmer 同构）。
    fn reduced_bits_of(s: &[u8]) -> u64 {
        let mut x = 0u64;
        for &b in s {
            x = (x << 2) | dna::base_code(b) as u64;
        }
        dna::reduce_bits(x)
    }

    #[test]
    fn table_invariants_hold_after_build() {
        let seq = b"TTAGGCATTACGATTGGCCATTAACGGTTACATTGGATCC";
        let idx = build_one(seq, params(8, 12, 1000));
        assert!(!idx.kmer_table.is_empty());
        assert_eq!(idx.tab_index.len(), idx.bucket_count() + 1);
        assert_eq!(*idx.tab_index.last().unwrap() as usize, idx.kmer_table.len());
        assert_eq!(idx.strand_table.len(), idx.kmer_table.len());
        for w in idx.tab_index.windows(2) {
            assert!(w[0] <= w[1]);
        }
        // 每个槽位的归约序列重新哈希后必须落回所在的桶
        for b in 0..idx.bucket_count() {
            let lo = idx.tab_index[b] as usize;
            let hi = idx.tab_index[b + 1] as usize;
            for i in lo..hi {
                let seq_bits = idx.reproduce_kmer(idx.kmer_table[i], idx.strand_table[i]);
                let k = idx.params.kmer_len as usize;
                let codes = (0..k).map(|j| ((seq_bits >> (2 * (k - 1 - j))) & 3) as u8);
                let h = RollHash::init(k, codes);
                assert_eq!(idx.bucket_of(h.fwd()), b, "slot {} not in its bucket", i);
            }
        }
    }

    #[test]
    fn frequent_kmers_are_blacklisted_and_removed() {
        // 周期序列：每个 8-mer 在窗口内反复出现，远超截断值 2
        let seq: Vec<u8> = (0..48).map(|i| b"ACGT"[i % 4]).collect();
        let idx = build_one(&seq, params(8, 12, 2));
        assert!(!idx.blacklist.is_empty());
        assert!(idx.kmer_table.is_empty(), "all entries should be purged");
        assert_eq!(*idx.tab_index.last().unwrap(), 0);
        // 已知的重复 k-mer 必须在黑名单中
        assert!(idx.blacklist.contains(&reduced_bits_of(b"ACGTACGT")));
        // 幸存条目不得重现黑名单 k-mer（此处为空集，性质平凡成立）
        for i in 0..idx.kmer_table.len() {
            let s = idx.reproduce_kmer(idx.kmer_table[i], idx.strand_table[i]);
            assert!(!idx.blacklist.contains(&s));
        }
    }

    #[test]
    fn at_most_one_entry_per_kmer_and_meta_region() {
        // 窗口内出现两份相同 8-mer；同一元区域只应留一个条目
        let seq = b"TTGGATCATTACGATCATTACGTTGGAATCCATTGGATCC";
        let idx = build_one(seq, params(8, 12, 1000));
        let mut seen: HashMap<(u64, usize), u32> = HashMap::new();
        for i in 0..idx.kmer_table.len() {
            let e = idx.kmer_table[i];
            let s = idx.reproduce_kmer(e, idx.strand_table[i]);
            *seen.entry((s, idx.meta_slot(e))).or_insert(0) += 1;
        }
        for ((s, m), n) in seen {
            assert_eq!(n, 1, "kmer {:#x} in meta slot {} has {} entries", s, m, n);
        }
    }

    #[test]
    fn regions_shorter_than_k_contribute_nothing() {
        // 染色体总长 6，起始 CpG 的窗口被截断到不足一个 k-mer
        let idx = build_one(b"ACGTAA", params(8, 12, 1000));
        assert_eq!(idx.cpg_start.len(), 1);
        assert!(idx.kmer_table.is_empty());
    }

    #[test]
    fn rejects_bad_params() {
        let r = RefIndex::build(
            vec![("chr1".to_string(), b"ACGT".to_vec())],
            params(33, 100, 10),
        );
        assert!(r.is_err());
        let r = RefIndex::build(vec![], params(8, 12, 10));
        assert!(r.is_err());
    }

    #[test]
    fn lossless_mode_retains_exact_text() {
        let p = IndexParams { lossless: true, ..params(8, 12, 1000) };
        let idx = build_one(b"TTAACGGTTACANTGGATCCTTAACGGTTACA", p);
        // N 在打包链中折叠为 A，无损文本保留原样
        assert_eq!(idx.exact_text(0, 10, 4), Some(&b"CANT"[..]));
        assert_eq!(idx.exact_text(0, 30, 4), None);

        let p = params(8, 12, 1000);
        let idx = build_one(b"TTAACGGTTACATTGGATCC", p);
        assert_eq!(idx.exact_text(0, 0, 4), None);
    }
}
