//! 参考 FASTA 读取。
//!
//! 只做结构解析：定位 `>` 头行、拼接序列行、剔除行内空白。
//! 碱基层面的规范化（大写、U -> T、未知字符 -> N）由索引构建
//! 统一处理，这里原样传出。

use std::io::BufRead;

use anyhow::{Context, Result};

/// 参考序列读取器，逐条返回 (染色体名, 序列)。
///
/// 头行只保留第一个空白分隔的字段作为染色体名，其余描述丢弃；
/// 首个头行之前的内容跳过。
pub struct ReferenceReader<R: BufRead> {
    reader: R,
    line: String,
    next_name: Option<String>,
    done: bool,
}

impl<R: BufRead> ReferenceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            next_name: None,
            done: false,
        }
    }

    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        Ok(self.reader.read_line(&mut self.line)? > 0)
    }

    /// 下一条序列；输入耗尽时返回 None。
    pub fn next_sequence(&mut self) -> Result<Option<(String, Vec<u8>)>> {
        if self.done {
            return Ok(None);
        }

        let name = match self.next_name.take() {
            Some(n) => n,
            None => loop {
                if !self.read_line()? {
                    self.done = true;
                    return Ok(None);
                }
                if let Some(h) = self.line.strip_prefix('>') {
                    break header_name(h);
                }
            },
        };

        let mut seq = Vec::new();
        loop {
            if !self.read_line()? {
                self.done = true;
                break;
            }
            if let Some(h) = self.line.strip_prefix('>') {
                self.next_name = Some(header_name(h));
                break;
            }
            seq.extend(self.line.bytes().filter(|b| !b.is_ascii_whitespace()));
        }

        Ok(Some((name, seq)))
    }
}

fn header_name(header: &str) -> String {
    header.split_whitespace().next().unwrap_or("").to_string()
}

/// 读入整个参考 FASTA，返回 (染色体名, 序列) 列表。
pub fn read_reference(path: &str) -> Result<Vec<(String, Vec<u8>)>> {
    let f = std::fs::File::open(path)
        .with_context(|| format!("failed to open reference '{}'", path))?;
    let mut reader = ReferenceReader::new(std::io::BufReader::new(f));
    let mut out = Vec::new();
    while let Some(rec) = reader.next_sequence()? {
        out.push(rec);
    }
    Ok(out)
}
