//! DNA 编码工具：2-bit 碱基编码、亚硫酸氢盐（bisulfite）归约字母表、
//! 以及位级匹配所需的掩码函数。
//!
//! 位编码约定（与参考基因组的 bit 打包一致）：
//!
//! ```text
//! A -> 00    C -> 01    G -> 10    T -> 11
//! N -> 00  （视作 A，不做区分；含 N 的窗口可能引入歧义匹配）
//! ```
//!
//! 归约字母表将 C 折叠到 T（甲基化/转化状态不影响种子匹配）。

/// 低位掩码：每个碱基对的低 bit。
pub const PAIR_LOW: u64 = 0x5555_5555_5555_5555;

/// 全字母表 2-bit 编码（A=0, C=1, G=2, T=3；N 与未知碱基归为 A）。
#[inline]
pub fn base_code(b: u8) -> u8 {
    match b.to_ascii_uppercase() {
        b'C' => 1,
        b'G' => 2,
        b'T' | b'U' => 3,
        _ => 0,
    }
}

/// 2-bit 编码还原为碱基字符。
#[inline]
pub fn code_base(c: u8) -> u8 {
    match c & 3 {
        1 => b'C',
        2 => b'G',
        3 => b'T',
        _ => b'A',
    }
}

/// read 端归约位表示：C 折叠为 T，用于与参考 k-mer 的掩码比较。
#[inline]
pub fn match_code(b: u8) -> u64 {
    match b.to_ascii_uppercase() {
        b'C' | b'T' | b'U' => 0b11,
        b'G' => 0b10,
        _ => 0b00,
    }
}

/// read 端归约位表示的互补版本：先取互补碱基，再做 C->T 折叠。
/// 用于从右向左扫描 read 的反向互补 k-mer。
#[inline]
pub fn match_code_rc(b: u8) -> u64 {
    match b.to_ascii_uppercase() {
        b'A' => 0b11,          // complement T
        b'C' => 0b10,          // complement G
        b'G' => 0b11,          // complement C, folded to T
        _ => 0b00,             // T/U -> A, N -> A
    }
}

/// 由参考 k-mer 位串生成显著性掩码。
///
/// 参考碱基为 C（01）的位置掩码为 01，其余位置为 11；k-mer 窗口以上的
/// 零填充区掩码保持全 1（read 侧同样零填充，异或后为 0）。由此
/// `ref ^ (read & mask) == 0` 当且仅当在归约字母表下逐碱基相同，
/// 且参考 C 同时接受 read 的 C 与 T。
#[inline]
pub fn match_mask(r: u64) -> u64 {
    // C 对的低 bit 为 1 且高 bit 为 0
    u64::MAX ^ ((!(r >> 1) & r & PAIR_LOW) << 1)
}

/// 将全字母表位串归约：C（01）改写为 T（11），其余不变。
#[inline]
pub fn reduce_bits(x: u64) -> u64 {
    x | ((!(x >> 1) & x & PAIR_LOW) << 1)
}

/// 规范化序列：大写化，U 归为 T，未知碱基归为 N。
pub fn normalize_seq(seq: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(seq.len());
    for &b in seq {
        let up = b.to_ascii_uppercase();
        let nb = match up {
            b'A' | b'C' | b'G' | b'T' | b'N' => up,
            b'U' => b'T',
            _ => b'N',
        };
        out.push(nb);
    }
    out
}

#[inline]
pub fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' | b'U' => b'A',
        _ => b'N',
    }
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(seq.len());
    for &b in seq.iter().rev() {
        out.push(complement(b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_code_roundtrip() {
        for &b in b"ACGT" {
            assert_eq!(code_base(base_code(b)), b);
        }
        // N 与未知字符折叠到 A
        assert_eq!(base_code(b'N'), 0);
        assert_eq!(base_code(b'x'), 0);
    }

    #[test]
    fn match_codes_fold_cytosine() {
        assert_eq!(match_code(b'C'), match_code(b'T'));
        assert_eq!(match_code(b'A'), 0b00);
        assert_eq!(match_code(b'G'), 0b10);
        // 互补侧：G 的互补 C 折叠到 T
        assert_eq!(match_code_rc(b'G'), 0b11);
        assert_eq!(match_code_rc(b'A'), 0b11);
        assert_eq!(match_code_rc(b'T'), 0b00);
    }

    #[test]
    fn mask_admits_read_t_on_reference_c() {
        // 参考 "CT" = 01 11
        let r = 0b0111u64;
        let mask = match_mask(r);
        // read "TT" = 11 11：掩码后应与参考相等
        assert_eq!(r ^ (0b1111 & mask), 0);
        // read "AT" = 00 11：A 不匹配参考 C
        assert_ne!(r ^ (0b0011 & mask), 0);
        // 参考 T 位置不接受 read 的 A
        let t = 0b11u64;
        assert_ne!(t ^ (0b00 & match_mask(t)), 0);
    }

    #[test]
    fn reduce_bits_folds_only_c() {
        // "ACGT" = 00 01 10 11 -> "ATGT" = 00 11 10 11
        assert_eq!(reduce_bits(0b0001_1011), 0b0011_1011);
        // 零填充区保持为零
        assert_eq!(reduce_bits(0), 0);
    }

    #[test]
    fn revcomp_basic() {
        assert_eq!(revcomp(b"ACGT"), b"ACGT");
        assert_eq!(revcomp(b"AACG"), b"CGTT");
        assert_eq!(normalize_seq(b"acgu?"), b"ACGTN");
    }
}
