//! # bsalign-rust
//!
//! 面向亚硫酸氢盐测序（bisulfite sequencing）数据的参考基因组索引
//! 与 read 匹配引擎。
//!
//! 本 crate 提供：
//!
//! - **索引构建**：定位参考基因组中的 CpG 位点，聚合为元区域，
//!   对区域窗口内的全部 k-mer（归约字母表，正反两链）建两遍法
//!   哈希表，带频率黑名单与区域内冗余过滤
//! - **种子匹配**：read 的每个 k-mer 窗口查表取候选，计数启发式
//!   剪枝后对打包基因组做位级精确验证
//! - **并行处理**：分块读入 FASTQ，块内 read 并行匹配，索引结构
//!   全程只读共享
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use bsalign_rust::align::{self, seed::Scratch};
//! use bsalign_rust::index::{IndexParams, RefIndex};
//!
//! # fn main() -> anyhow::Result<()> {
//! // 构建索引
//! let reference = vec![(
//!     "chr1".to_string(),
//!     b"GAATTGAGTAGAGGATTACGTAGGATAGCGTTAGAAGGTA".to_vec(),
//! )];
//! let params = IndexParams { kmer_len: 8, read_len: 20, ..IndexParams::default() };
//! let idx = RefIndex::build(reference, params)?;
//!
//! // 匹配一条 read
//! let read = b"GAGTAGAGGATTACGTAGGA";
//! let mut scratch = Scratch::new(idx.meta_slots());
//! let (candidates, _) = align::match_read(&idx, read, 2, &mut scratch, false);
//! for c in candidates {
//!     println!("chr{} pos {} strand {}", c.chrom, c.pos, c.strand);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — FASTA 参考读入与分块 FASTQ 解析
//! - [`index`] — 2-bit 打包、CpG 元区域、k-mer 哈希表与持久化
//! - [`align`] — 种子检索、启发式过滤、位级验证与并行驱动
//! - [`util`] — DNA 编码与亚硫酸氢盐归约字母表工具

pub mod align;
pub mod index;
pub mod io;
pub mod util;
