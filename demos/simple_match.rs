//! 演示如何在 library 模式下使用 bsalign-rust 进行 read 匹配。
//!
//! 运行方式：
//! ```bash
//! cargo run --example simple_match
//! ```

use bsalign_rust::align::{self, seed::Scratch};
use bsalign_rust::index::{IndexParams, RefIndex};

fn main() -> anyhow::Result<()> {
    // 1. 玩具参考序列：两个 CpG 位点相距 10 个碱基
    let reference = b"GAATTGAGTAGAGGATTACGTAGGATAGCGTTAGAAGGTA";
    println!("参考序列: {}", std::str::from_utf8(reference).unwrap());
    println!("参考长度: {} bp", reference.len());

    // 2. 构建 CpG 锚定的 k-mer 索引
    let params = IndexParams {
        kmer_len: 8,
        read_len: 20,
        table_bits: 12,
        ..IndexParams::default()
    };
    let idx = RefIndex::build(vec![("chr1".to_string(), reference.to_vec())], params)?;
    println!(
        "索引构建完成：元区域={}, 哈希条目={}, 黑名单={}",
        idx.meta_slots(),
        idx.kmer_table.len(),
        idx.blacklist.len()
    );

    let mut scratch = Scratch::new(idx.meta_slots());

    // 3. 精确 read：取自参考位置 5
    let read = &reference[5..25];
    let (candidates, _) = align::match_read(&idx, read, 2, &mut scratch, false);
    println!("\n精确 read '{}':", std::str::from_utf8(read).unwrap());
    for c in &candidates {
        println!("  chrom={} pos={} strand={}", idx.chroms[c.chrom as usize].name, c.pos, c.strand);
    }

    // 4. 亚硫酸氢盐转化后的 read：C 全部转为 T，仍然应当命中原位置
    let converted: Vec<u8> = read
        .iter()
        .map(|&b| if b == b'C' { b'T' } else { b })
        .collect();
    let (candidates, _) = align::match_read(&idx, &converted, 2, &mut scratch, false);
    println!("\n转化 read '{}':", std::str::from_utf8(&converted).unwrap());
    for c in &candidates {
        println!("  chrom={} pos={} strand={}", idx.chroms[c.chrom as usize].name, c.pos, c.strand);
    }

    Ok(())
}
