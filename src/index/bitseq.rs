use serde::{Deserialize, Serialize};

use crate::util::dna;

/// 单条染色体的 2-bit 密集打包表示。
///
/// 编码：A=00, C=01, G=10, T=11；N 打包为 A（00），不做哨兵区分。
/// 碱基按 MSB 优先存入 64-bit 字，碱基 `i` 占据字 `i/32` 的
/// bit `[62 - 2*(i%32), 63 - 2*(i%32)]`，因此任意 k<=32 的窗口
/// 至多横跨两个字，可在 O(1) 内取出。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedStrand {
    words: Vec<u64>,
    len: u32,
}

impl PackedStrand {
    /// 打包一条规范化后的碱基序列（ACGTN 大写）。
    pub fn pack(seq: &[u8]) -> Self {
        let len = seq.len() as u32;
        let mut words = vec![0u64; (seq.len() + 31) / 32];
        for (i, &b) in seq.iter().enumerate() {
            let code = dna::base_code(b) as u64;
            words[i / 32] |= code << (62 - 2 * (i % 32));
        }
        Self { words, len }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 位置 `pos` 处碱基的 2-bit 编码。
    #[inline]
    pub fn code_at(&self, pos: u32) -> u8 {
        let i = pos as usize;
        ((self.words[i / 32] >> (62 - 2 * (i % 32))) & 3) as u8
    }

    /// 取出 `[pos, pos+k)` 的正向窗口，右对齐（首碱基在最高有效位对），
    /// 高位补零。越界属于调用方契约违例。
    #[inline]
    pub fn kmer(&self, pos: u32, k: usize) -> u64 {
        debug_assert!(k >= 1 && k <= 32);
        debug_assert!(pos + k as u32 <= self.len);
        let bit = 2 * pos as usize;
        let wi = bit >> 6;
        let off = bit & 63;
        let mut x = self.words[wi] << off;
        if off > 0 && wi + 1 < self.words.len() {
            x |= self.words[wi + 1] >> (64 - off);
        }
        x >> (64 - 2 * k)
    }

    /// 同一窗口的反向互补，右对齐。
    #[inline]
    pub fn kmer_revcomp(&self, pos: u32, k: usize) -> u64 {
        let fwd = self.kmer(pos, k);
        (reverse_pairs(fwd) >> (64 - 2 * k)) ^ (u64::MAX >> (64 - 2 * k))
    }
}

/// 反转 u64 内 32 个 2-bit 对的顺序。
#[inline]
fn reverse_pairs(mut x: u64) -> u64 {
    x = ((x & 0x3333_3333_3333_3333) << 2) | ((x >> 2) & 0x3333_3333_3333_3333);
    x = ((x & 0x0f0f_0f0f_0f0f_0f0f) << 4) | ((x >> 4) & 0x0f0f_0f0f_0f0f_0f0f);
    x.swap_bytes()
}
