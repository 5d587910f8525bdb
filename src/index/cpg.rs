use serde::{Deserialize, Serialize};

/// 参考基因组中的一个 CpG 二核苷酸位点。
///
/// 主表中 `pos` 存的是侧翼窗口起点（C 的位置减去 `read_len - 2`），
/// 这样 k-mer 偏移可以直接相对窗口起点计算；起始表（距序列开头不足
/// 一个左侧翼的 CpG）中 `pos` 为 C 在染色体上的原始位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpg {
    pub chrom: u8,
    pub pos: u32,
}

/// 一段连续 CpG 的元区域：指向 CpG 表的半开区间 `[start, end)`。
///
/// 区间内相邻 CpG 的侧翼窗口互相重叠，因此它们的 k-mer 共享同一组
/// 索引条目。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaCpg {
    pub start: u32,
    pub end: u32,
}

/// CpG 定位与元区域划分的结果，四张表均按基因组位置升序。
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CpgTables {
    pub cpg: Vec<Cpg>,
    pub cpg_start: Vec<Cpg>,
    pub meta: Vec<MetaCpg>,
    pub meta_start: Vec<MetaCpg>,
}

/// 一个 CpG 的侧翼窗口长度：左右各 `read_len - 2` 个碱基加上 CG 本身。
#[inline]
pub fn window_len(read_len: u32) -> u32 {
    2 * read_len - 2
}

/// 元区域跨度上限，保证所有条目偏移都能放进 16-bit 偏移字段。
#[inline]
fn max_meta_span(read_len: u32) -> u32 {
    u16::MAX as u32 - window_len(read_len)
}

/// 扫描所有染色体，定位 CpG 并聚合元区域。
///
/// 相邻 CpG 的窗口起点相距不超过一个窗口长度（即两个侧翼能互相
/// 覆盖）时归入同一元区域；跨度达到偏移字段上限时强制另起区域。
/// 起始表中的 CpG 距离序列开头不足一个左侧翼，同一染色体的这些
/// CpG 聚成一个起始元区域。
pub fn group(seqs: &[Vec<u8>], read_len: u32) -> CpgTables {
    let flank = read_len - 2;
    let win = window_len(read_len);
    let span_cap = max_meta_span(read_len);

    let mut t = CpgTables::default();
    for (chrom, seq) in seqs.iter().enumerate() {
        let chrom = chrom as u8;
        let start_begin = t.cpg_start.len() as u32;
        for i in 0..seq.len().saturating_sub(1) {
            if seq[i] == b'C' && seq[i + 1] == b'G' {
                let p = i as u32;
                if p < flank {
                    t.cpg_start.push(Cpg { chrom, pos: p });
                } else {
                    t.cpg.push(Cpg { chrom, pos: p - flank });
                }
            }
        }
        let start_end = t.cpg_start.len() as u32;
        if start_end > start_begin {
            t.meta_start.push(MetaCpg { start: start_begin, end: start_end });
        }
    }

    // 主表元区域划分
    let mut i = 0usize;
    while i < t.cpg.len() {
        let first = t.cpg[i];
        let mut j = i + 1;
        while j < t.cpg.len() {
            let c = t.cpg[j];
            let prev = t.cpg[j - 1];
            if c.chrom != first.chrom
                || c.pos - prev.pos > win
                || c.pos - first.pos > span_cap
            {
                break;
            }
            j += 1;
        }
        t.meta.push(MetaCpg { start: i as u32, end: j as u32 });
        i = j;
    }

    t
}
