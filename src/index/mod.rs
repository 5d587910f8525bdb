//! CpG 锚定的 k-mer 哈希索引。
//!
//! - [`bitseq`] — 参考基因组的 2-bit 打包与 O(1) k-mer 窗口抽取
//! - [`cpg`] — CpG 定位与元区域（meta region）划分
//! - [`hash`] — 归约字母表上的 ntHash 滚动哈希
//! - [`build`] — 两遍法哈希表构建、黑名单与冗余过滤
//! - [`store`] — 索引的二进制持久化与加载校验

use std::collections::HashSet;
use std::hash::{BuildHasherDefault, Hasher};

use serde::{Deserialize, Serialize};

pub mod bitseq;
pub mod build;
pub mod cpg;
pub mod hash;
pub mod store;

use bitseq::PackedStrand;
use cpg::{Cpg, MetaCpg};

/// 条目偏移字段的位宽。
const OFFSET_BITS: u32 = 16;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;
const START_FLAG: u64 = 1 << 63;

/// 哈希表中的一个 k-mer 条目，打包进一个 u64。
///
/// 位布局（高到低）：
///
/// ```text
/// bit 63      起始区域标志（1 = 条目属于起始元区域表）
/// bit 62..16  元区域编号
/// bit 15..0   k-mer 起点相对元区域窗口起点的偏移
/// ```
///
/// 偏移相对 CpG 上下文而非绝对基因组坐标；绝对位置在查询时经
/// 元区域 -> CpG 表 -> 染色体/位置 组合求得。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KmerEntry(u64);

impl KmerEntry {
    #[inline]
    pub fn new(meta: usize, offset: u16, start_region: bool) -> Self {
        let mut v = ((meta as u64) << OFFSET_BITS) | offset as u64;
        if start_region {
            v |= START_FLAG;
        }
        Self(v)
    }

    #[inline]
    pub fn meta(self) -> usize {
        ((self.0 & !START_FLAG) >> OFFSET_BITS) as usize
    }

    #[inline]
    pub fn offset(self) -> u32 {
        (self.0 & OFFSET_MASK) as u32
    }

    #[inline]
    pub fn is_start_region(self) -> bool {
        self.0 & START_FLAG != 0
    }
}

/// 黑名单集合的直通哈希：k-mer 的归约位串本身已经分布良好，
/// 直接用作哈希值。
#[derive(Debug, Default)]
pub struct KmerIdentityHasher {
    state: u64,
}

impl Hasher for KmerIdentityHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state = (self.state << 8) | b as u64;
        }
    }

    #[inline]
    fn write_u64(&mut self, v: u64) {
        self.state = v;
    }
}

/// 黑名单：因基因组内出现次数超过截断值而被剔除的 k-mer 归约位串。
pub type KmerSet = HashSet<u64, BuildHasherDefault<KmerIdentityHasher>>;

/// 染色体元信息：内部数值编号即其在表中的下标。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chromosome {
    pub name: String,
    pub len: u32,
}

/// 索引构建参数，随索引一同持久化，匹配阶段沿用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    /// k-mer 长度，1..=32。
    pub kmer_len: u32,
    /// 预期 read 长度，决定 CpG 侧翼窗口大小。
    pub read_len: u32,
    /// 哈希桶数的以 2 为底的对数。
    pub table_bits: u32,
    /// 频率黑名单截断值：出现次数严格大于该值的 k-mer 被剔除。
    pub kmer_cutoff: u32,
    /// 无损模式：额外保留规范化后的原始序列。
    pub lossless: bool,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            kmer_len: 20,
            read_len: 100,
            table_bits: 26,
            kmer_cutoff: 1500,
            lossless: false,
        }
    }
}

/// 构建现场信息，仅作诊断用途。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

/// 参考基因组索引：打包序列、CpG/元区域表、k-mer 哈希表与黑名单。
///
/// 构建完成后只读；匹配阶段的所有线程共享同一份实例，无需同步。
#[derive(Debug, Serialize, Deserialize)]
pub struct RefIndex {
    pub params: IndexParams,
    pub meta_info: IndexMeta,
    /// 染色体编号 -> 名称/长度
    pub chroms: Vec<Chromosome>,
    pub cpg: Vec<Cpg>,
    pub cpg_start: Vec<Cpg>,
    pub meta: Vec<MetaCpg>,
    pub meta_start: Vec<MetaCpg>,
    /// 每条染色体的 2-bit 打包正链
    pub strands: Vec<PackedStrand>,
    /// `tab_index[h]` 为桶 h 在 `kmer_table` 中的起始下标，
    /// 单调不减，长度为桶数 + 1
    pub tab_index: Vec<u64>,
    pub kmer_table: Vec<KmerEntry>,
    /// 与 `kmer_table` 平行的链方向标志（true = 正链）
    pub strand_table: Vec<bool>,
    pub blacklist: KmerSet,
    /// 无损模式下保留的规范化序列
    pub full_seq: Option<Vec<Vec<u8>>>,
}

impl RefIndex {
    #[inline]
    pub fn bucket_count(&self) -> usize {
        1 << self.params.table_bits
    }

    #[inline]
    pub fn bucket_of(&self, hash: u64) -> usize {
        (hash & (self.bucket_count() as u64 - 1)) as usize
    }

    /// 桶 `b` 的条目与链方向切片。
    #[inline]
    pub fn bucket_slice(&self, b: usize) -> (&[KmerEntry], &[bool]) {
        let lo = self.tab_index[b] as usize;
        let hi = self.tab_index[b + 1] as usize;
        (&self.kmer_table[lo..hi], &self.strand_table[lo..hi])
    }

    /// 解析条目的染色体编号与元区域窗口在染色体上的起点。
    /// 条目的绝对 k-mer 位置为 `窗口起点 + entry.offset()`。
    #[inline]
    pub fn kmer_origin(&self, e: KmerEntry) -> (usize, u32) {
        if e.is_start_region() {
            let cpg_ind = self.meta_start[e.meta()].start as usize;
            (self.cpg_start[cpg_ind].chrom as usize, 0)
        } else {
            let cpg_ind = self.meta[e.meta()].start as usize;
            let c = self.cpg[cpg_ind];
            (c.chrom as usize, c.pos)
        }
    }

    /// 把主表/起始表元区域映射进同一个计数下标空间。
    #[inline]
    pub fn meta_slot(&self, e: KmerEntry) -> usize {
        if e.is_start_region() {
            self.meta.len() + e.meta()
        } else {
            e.meta()
        }
    }

    /// 计数下标空间的大小（主表与起始表元区域总数）。
    #[inline]
    pub fn meta_slots(&self) -> usize {
        self.meta.len() + self.meta_start.len()
    }

    /// 按名称查染色体编号。
    pub fn chrom_id(&self, name: &str) -> Option<usize> {
        self.chroms.iter().position(|c| c.name == name)
    }

    /// 无损模式下还原某位置的原始文本（N 不折叠为 A）。
    /// 非无损索引或越界时返回 None。
    pub fn exact_text(&self, chrom: usize, pos: u32, len: usize) -> Option<&[u8]> {
        let seq = self.full_seq.as_ref()?.get(chrom)?;
        seq.get(pos as usize..pos as usize + len)
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta_info = meta;
    }
}
