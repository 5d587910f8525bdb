//! 索引的二进制持久化。
//!
//! 整个 [`RefIndex`] 序列化为单个 bincode 文件；加载后先做结构
//! 校验再交给匹配阶段，损坏或版本不符的文件在这里报错而不是在
//! 深处 panic。

use std::io::{BufReader, BufWriter};

use anyhow::{bail, Context, Result};

use super::RefIndex;

impl RefIndex {
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let f = std::fs::File::create(path)
            .with_context(|| format!("failed to create index file '{}'", path))?;
        let mut w = BufWriter::new(f);
        bincode::serialize_into(&mut w, self)
            .with_context(|| format!("failed to serialize index to '{}'", path))?;
        Ok(())
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path)
            .with_context(|| format!("failed to open index file '{}'", path))?;
        let idx: Self = bincode::deserialize_from(BufReader::new(f))
            .with_context(|| format!("failed to deserialize index from '{}'", path))?;
        idx.validate()?;
        Ok(idx)
    }

    /// 加载后的一致性校验。
    ///
    /// 不做全量语义验证，只检查会让匹配阶段越界的结构性破坏。
    pub fn validate(&self) -> Result<()> {
        let p = &self.params;
        if p.kmer_len < 1 || p.kmer_len > 32 {
            bail!("index k-mer length {} outside 1..=32", p.kmer_len);
        }
        if p.table_bits < 1 || p.table_bits > 32 {
            bail!("index table bits {} outside 1..=32", p.table_bits);
        }
        let bc = self.bucket_count();
        if self.tab_index.len() != bc + 1 {
            bail!(
                "tab_index has {} entries, expected {} for {} buckets",
                self.tab_index.len(),
                bc + 1,
                bc
            );
        }
        if self.tab_index[0] != 0 {
            bail!("tab_index does not start at 0");
        }
        for (b, w) in self.tab_index.windows(2).enumerate() {
            if w[0] > w[1] {
                bail!("tab_index not monotonic at bucket {}", b);
            }
        }
        let total = self.tab_index[bc] as usize;
        if total != self.kmer_table.len() {
            bail!(
                "tab_index covers {} entries but kmer table holds {}",
                total,
                self.kmer_table.len()
            );
        }
        if self.strand_table.len() != self.kmer_table.len() {
            bail!(
                "strand table length {} does not match kmer table length {}",
                self.strand_table.len(),
                self.kmer_table.len()
            );
        }
        if self.strands.len() != self.chroms.len() {
            bail!(
                "{} packed strands for {} chromosomes",
                self.strands.len(),
                self.chroms.len()
            );
        }
        for (i, (s, c)) in self.strands.iter().zip(&self.chroms).enumerate() {
            if s.len() != c.len {
                bail!("chromosome {} packed length {} != declared {}", i, s.len(), c.len);
            }
        }
        for (i, c) in self.cpg.iter().enumerate() {
            if (c.chrom as usize) >= self.chroms.len() {
                bail!("CpG {} references unknown chromosome {}", i, c.chrom);
            }
        }
        for (i, c) in self.cpg_start.iter().enumerate() {
            if (c.chrom as usize) >= self.chroms.len() {
                bail!("start CpG {} references unknown chromosome {}", i, c.chrom);
            }
        }
        check_meta_ranges(&self.meta, self.cpg.len(), "meta")?;
        check_meta_ranges(&self.meta_start, self.cpg_start.len(), "start meta")?;
        for (i, e) in self.kmer_table.iter().enumerate() {
            let bound = if e.is_start_region() { self.meta_start.len() } else { self.meta.len() };
            if e.meta() >= bound {
                bail!("table entry {} references meta region {} of {}", i, e.meta(), bound);
            }
        }
        if let Some(seqs) = &self.full_seq {
            if seqs.len() != self.chroms.len() {
                bail!("lossless payload holds {} sequences for {} chromosomes", seqs.len(), self.chroms.len());
            }
        }
        Ok(())
    }
}

fn check_meta_ranges(metas: &[super::MetaCpg], cpg_len: usize, what: &str) -> Result<()> {
    for (i, m) in metas.iter().enumerate() {
        if m.start >= m.end || m.end as usize > cpg_len {
            bail!(
                "{} region {} has range [{}, {}) over {} CpGs",
                what,
                i,
                m.start,
                m.end,
                cpg_len
            );
        }
    }
    Ok(())
}
