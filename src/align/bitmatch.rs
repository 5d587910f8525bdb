//! 位级精确验证。
//!
//! 对计数启发式幸存的种子做最终判定：把 read 当前窗口滚动维护成
//! 归约位串，从打包基因组按条目链方向取出参考 k-mer，在显著性掩码
//! 下做异或比较。掩码让参考 C 位置同时接受 read 的 C 与 T，其余
//! 位置要求归约字母表下逐碱基相同。

use crate::index::RefIndex;
use crate::util::dna;

use super::seed::SeedHit;

/// 条目在参考上的绝对 k-mer 位置，越过染色体末端时为 None。
#[inline]
fn resolve(idx: &RefIndex, hit: SeedHit) -> Option<(usize, u32)> {
    let (chrom, base) = idx.kmer_origin(hit.entry);
    let p = base + hit.entry.offset();
    let k = idx.params.kmer_len;
    if p + k > idx.strands[chrom].len() {
        return None;
    }
    Some((chrom, p))
}

#[inline]
fn survives(idx: &RefIndex, hit: SeedHit, read_bits: u64) -> bool {
    let k = idx.params.kmer_len as usize;
    let Some((chrom, p)) = resolve(idx, hit) else {
        return false;
    };
    let ref_bits = if hit.fwd_ref {
        idx.strands[chrom].kmer(p, k)
    } else {
        idx.strands[chrom].kmer_revcomp(p, k)
    };
    ref_bits ^ (read_bits & dna::match_mask(ref_bits)) == 0
}

/// 正向扫描：`lists[o]` 对照 read 第 o 个窗口的归约位串过滤。
pub fn bit_matching(idx: &RefIndex, read: &[u8], lists: &mut [Vec<SeedHit>]) {
    let k = idx.params.kmer_len as usize;
    if read.len() < k {
        return;
    }
    let signi = u64::MAX >> (64 - 2 * k);

    let mut bits = 0u64;
    for &b in &read[..k] {
        bits = (bits << 2) | dna::match_code(b);
    }
    for (o, list) in lists.iter_mut().enumerate() {
        if o > 0 {
            bits = ((bits << 2) | dna::match_code(read[o + k - 1])) & signi;
        }
        list.retain(|&hit| survives(idx, hit, bits));
    }
}

/// 反向互补扫描：`lists[j]` 对照 read 反向互补序列第 j 个窗口过滤。
///
/// 位串直接在原 read 上自右向左滚动构造（互补后 C 折叠到 T），
/// 与先物化反向互补序列再正向扫描等价。
pub fn bit_matching_rev(idx: &RefIndex, read: &[u8], lists: &mut [Vec<SeedHit>]) {
    let k = idx.params.kmer_len as usize;
    let l = read.len();
    if l < k {
        return;
    }
    let signi = u64::MAX >> (64 - 2 * k);

    let mut bits = 0u64;
    for i in (l - k..l).rev() {
        bits = (bits << 2) | dna::match_code_rc(read[i]);
    }
    for (j, list) in lists.iter_mut().enumerate() {
        if j > 0 {
            bits = ((bits << 2) | dna::match_code_rc(read[l - k - j])) & signi;
        }
        list.retain(|&hit| survives(idx, hit, bits));
    }
}
