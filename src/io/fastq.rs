use anyhow::Result;
use log::warn;
use std::io::BufRead;

/// 一条测序 read。
#[derive(Debug, Clone)]
pub struct ReadRecord {
    pub id: String,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

/// 分块 FASTQ 读取器。
///
/// 匹配阶段按固定大小的块消费 read，块内并行处理；单条损坏的
/// 记录跳过并告警，不中止整个流。跳过后从下一个以 '@' 开头的行
/// 重新同步。
pub struct FastqChunkReader<R: BufRead> {
    reader: R,
    buf: String,
    done: bool,
    skipped: u64,
    pending_header: Option<String>,
}

impl<R: BufRead> FastqChunkReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            done: false,
            skipped: 0,
            pending_header: None,
        }
    }

    /// 因格式损坏被跳过的记录数。
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// 读取至多 `chunk_size` 条记录填入 `out`（先清空）。
    /// 返回 false 表示输入已经耗尽。
    pub fn fill_chunk(&mut self, out: &mut Vec<ReadRecord>, chunk_size: usize) -> Result<bool> {
        out.clear();
        while out.len() < chunk_size {
            match self.next_record()? {
                Some(r) => out.push(r),
                None => return Ok(false),
            }
        }
        Ok(!self.done)
    }

    fn next_record(&mut self) -> Result<Option<ReadRecord>> {
        loop {
            let header = match self.take_header()? {
                Some(h) => h,
                None => return Ok(None),
            };
            let id = header
                .split(char::is_whitespace)
                .next()
                .unwrap_or("")
                .to_string();

            // sequence line
            if !self.read_line()? {
                warn!("truncated FASTQ record '{}' at end of input, skipping", id);
                self.skipped += 1;
                return Ok(None);
            }
            let seq = self.buf.trim_end().as_bytes().to_vec();

            // plus line
            if !self.read_line()? {
                warn!("truncated FASTQ record '{}' at end of input, skipping", id);
                self.skipped += 1;
                return Ok(None);
            }
            if !self.buf.starts_with('+') {
                warn!("malformed FASTQ record '{}': missing '+' line, skipping", id);
                self.skipped += 1;
                // 这一行可能已经是下一条记录的头
                if self.buf.starts_with('@') {
                    self.pending_header = Some(self.buf[1..].trim_end().to_string());
                }
                continue;
            }

            // quality line
            if !self.read_line()? {
                warn!("truncated FASTQ record '{}' at end of input, skipping", id);
                self.skipped += 1;
                return Ok(None);
            }
            let qual = self.buf.trim_end().as_bytes().to_vec();
            if qual.len() != seq.len() {
                warn!(
                    "malformed FASTQ record '{}': {} quality values for {} bases, skipping",
                    id,
                    qual.len(),
                    seq.len()
                );
                self.skipped += 1;
                continue;
            }

            return Ok(Some(ReadRecord { id, seq, qual }));
        }
    }

    /// 找到下一个记录头；对非 '@' 的垃圾行告警一次并继续扫描。
    fn take_header(&mut self) -> Result<Option<String>> {
        if let Some(h) = self.pending_header.take() {
            return Ok(Some(h));
        }
        let mut warned = false;
        loop {
            if !self.read_line()? {
                return Ok(None);
            }
            if self.buf.starts_with('@') {
                return Ok(Some(self.buf[1..].trim_end().to_string()));
            }
            if !self.buf.trim().is_empty() && !warned {
                warn!("skipping stray FASTQ line while searching for '@' header");
                warned = true;
            }
        }
    }

    /// 读入一行；EOF 时返回 false 并置结束标志。
    fn read_line(&mut self) -> Result<bool> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            self.done = true;
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(data: &[u8]) -> FastqChunkReader<Cursor<Vec<u8>>> {
        FastqChunkReader::new(Cursor::new(data.to_vec()))
    }

    #[test]
    fn reads_in_chunks() {
        let data = b"@r1\nACGT\n+\nIIII\n@r2\nTTTT\n+\nIIII\n@r3\nGGGG\n+\nIIII\n";
        let mut r = reader(data);
        let mut chunk = Vec::new();

        assert!(r.fill_chunk(&mut chunk, 2).unwrap());
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk[0].id, "r1");
        assert_eq!(chunk[1].seq, b"TTTT");

        assert!(!r.fill_chunk(&mut chunk, 2).unwrap());
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk[0].id, "r3");
        assert_eq!(r.skipped(), 0);
    }

    #[test]
    fn skips_record_with_missing_plus_line() {
        let data = b"@r1\nACGT\n@r2\nTTTT\n+\nIIII\n";
        let mut r = reader(data);
        let mut chunk = Vec::new();
        r.fill_chunk(&mut chunk, 10).unwrap();
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk[0].id, "r2");
        assert_eq!(r.skipped(), 1);
    }

    #[test]
    fn skips_record_with_length_mismatch() {
        let data = b"@r1\nACGT\n+\nII\n@r2\nAAAA\n+\nIIII\n";
        let mut r = reader(data);
        let mut chunk = Vec::new();
        r.fill_chunk(&mut chunk, 10).unwrap();
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk[0].id, "r2");
        assert_eq!(r.skipped(), 1);
    }

    #[test]
    fn counts_truncated_tail() {
        let data = b"@r1\nACGT\n+\nIIII\n@r2\nAC";
        let mut r = reader(data);
        let mut chunk = Vec::new();
        assert!(!r.fill_chunk(&mut chunk, 10).unwrap());
        assert_eq!(chunk.len(), 1);
        assert_eq!(r.skipped(), 1);
    }

    #[test]
    fn resyncs_after_stray_lines() {
        let data = b"junk\nmore junk\n@r1\nACGT\n+\nIIII\n";
        let mut r = reader(data);
        let mut chunk = Vec::new();
        r.fill_chunk(&mut chunk, 10).unwrap();
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk[0].id, "r1");
    }
}
