//! 归约字母表上的 ntHash 滚动哈希。
//!
//! 构建与查询共用同一套哈希：k-mer 的每个碱基经 C->T 折叠后查种子表，
//! 正向哈希为 `Σ rol(seed(s[i]), k-1-i)`，反向互补哈希在互补归约域上
//! 对称定义。窗口右移一位的更新为 O(1)，与窗口长度无关。

/// ntHash 的碱基种子常量。
const SEED_A: u64 = 0x3c8b_fbb3_95c6_0474;
const SEED_C: u64 = 0x3193_c185_62a0_2b4c;
const SEED_G: u64 = 0x2032_3ed0_8257_2324;
const SEED_T: u64 = 0x2955_49f5_4be2_4456;

/// 按 2-bit 编码（A=0,C=1,G=2,T=3）索引的正向种子表；C 槽位折叠到 T。
const FWD_SEED: [u64; 4] = [SEED_A, SEED_T, SEED_G, SEED_T];

/// 反向互补种子表：`seed(reduce(complement(base)))`。
/// A->T, C->G, G->(C->T), T->A。
const RC_SEED: [u64; 4] = [SEED_T, SEED_G, SEED_T, SEED_A];

/// 一个 k-mer 窗口的正向/反向互补滚动哈希对。
#[derive(Debug, Clone, Copy)]
pub struct RollHash {
    k: u32,
    fwd: u64,
    rc: u64,
}

impl RollHash {
    /// 从窗口的 k 个 2-bit 编码初始化。
    pub fn init<I>(k: usize, codes: I) -> Self
    where
        I: IntoIterator<Item = u8>,
    {
        let mut fwd = 0u64;
        let mut rc = 0u64;
        let mut n = 0u32;
        for c in codes {
            let ci = (c & 3) as usize;
            fwd = fwd.rotate_left(1) ^ FWD_SEED[ci];
            rc ^= RC_SEED[ci].rotate_left(n);
            n += 1;
        }
        debug_assert_eq!(n as usize, k);
        Self { k: k as u32, fwd, rc }
    }

    /// 窗口右移一位：`out` 为移出的首碱基编码，`inc` 为移入的末碱基编码。
    #[inline]
    pub fn roll(&mut self, out: u8, inc: u8) {
        let o = (out & 3) as usize;
        let i = (inc & 3) as usize;
        self.fwd = self.fwd.rotate_left(1) ^ FWD_SEED[o].rotate_left(self.k) ^ FWD_SEED[i];
        self.rc = (self.rc ^ RC_SEED[o]).rotate_right(1) ^ RC_SEED[i].rotate_left(self.k - 1);
    }

    #[inline]
    pub fn fwd(&self) -> u64 {
        self.fwd
    }

    #[inline]
    pub fn rc(&self) -> u64 {
        self.rc
    }
}
