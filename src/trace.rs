//! Binary operation traces.
//!
//! A trace file records a sequence of priority-queue operations so a
//! workload captured from one application can be replayed, bit for bit,
//! against any queue implementation. The format is little-endian and
//! packed: a 16-byte header (operation count, distinct queue-ID count,
//! distinct node-ID count) followed by one record per operation, each
//! starting with a `u32` code that fixes the record's length.
//!
//! Writers buffer through an internal 128 KiB buffer. The header is
//! written first with a zero operation count and rewritten by
//! [`TraceWriter::finish`] once the counts are known; the rewrite flushes
//! before seeking, and the writer flushes again before the descriptor
//! closes. Skipping either flush silently truncates the trace.
//!
//! Readers yield `Ok(None)` at a clean end of file, an error for a
//! truncated record or an unknown operation code.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::queue::{ItemType, KeyType};

/// Size of the writer's internal buffer.
const WRITE_BUFFER_SIZE: usize = 131_072;

/// Trace I/O errors.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Underlying file error, including truncated records.
    #[error("trace i/o failed: {0}")]
    Io(#[from] io::Error),
    /// A record began with a code outside the operation table.
    #[error("unknown trace op code {0}")]
    UnknownOpCode(u32),
}

/// Trace file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceHeader {
    /// Number of operation records following the header.
    pub op_count: u64,
    /// Count of distinct queue IDs appearing in the trace.
    pub pq_ids: u32,
    /// Count of distinct node IDs appearing in the trace.
    pub node_ids: u32,
}

/// One recorded operation.
///
/// IDs are dense indices assigned by the generator; the replay driver
/// maps them to live queues and handles through tables sized from the
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    /// Code 0.
    Create { pq_id: u32 },
    /// Code 1.
    Destroy { pq_id: u32 },
    /// Code 2.
    Clear { pq_id: u32 },
    /// Code 3.
    GetKey { pq_id: u32, node_id: u32 },
    /// Code 4.
    GetItem { pq_id: u32, node_id: u32 },
    /// Code 5.
    GetSize { pq_id: u32 },
    /// Code 6.
    Insert {
        pq_id: u32,
        node_id: u32,
        key: KeyType,
        item: ItemType,
    },
    /// Code 7.
    FindMin { pq_id: u32 },
    /// Code 8.
    Delete { pq_id: u32, node_id: u32 },
    /// Code 9.
    DeleteMin { pq_id: u32 },
    /// Code 10.
    DecreaseKey { pq_id: u32, node_id: u32, key: KeyType },
    /// Code 11.
    Meld {
        pq_src1_id: u32,
        pq_src2_id: u32,
        pq_dst_id: u32,
    },
    /// Code 12.
    Empty { pq_id: u32 },
}

impl TraceOp {
    /// The record's operation code.
    pub fn code(&self) -> u32 {
        match self {
            TraceOp::Create { .. } => 0,
            TraceOp::Destroy { .. } => 1,
            TraceOp::Clear { .. } => 2,
            TraceOp::GetKey { .. } => 3,
            TraceOp::GetItem { .. } => 4,
            TraceOp::GetSize { .. } => 5,
            TraceOp::Insert { .. } => 6,
            TraceOp::FindMin { .. } => 7,
            TraceOp::Delete { .. } => 8,
            TraceOp::DeleteMin { .. } => 9,
            TraceOp::DecreaseKey { .. } => 10,
            TraceOp::Meld { .. } => 11,
            TraceOp::Empty { .. } => 12,
        }
    }

    /// On-disk length in bytes of a record with the given code,
    /// including the code itself.
    pub fn wire_len(code: u32) -> Option<usize> {
        Some(match code {
            0 | 1 | 2 | 5 | 7 | 9 | 12 => 8,
            3 | 4 | 8 => 12,
            6 => 24,
            10 => 20,
            11 => 16,
            _ => return None,
        })
    }
}

/// Buffered trace writer.
pub struct TraceWriter {
    out: BufWriter<File>,
    op_count: u64,
}

impl TraceWriter {
    /// Create a trace file, writing a placeholder header.
    ///
    /// The final header goes in at [`finish`](Self::finish); a trace that
    /// is never finished keeps `op_count = 0` and replays as empty.
    pub fn create(path: &Path, pq_ids: u32, node_ids: u32) -> Result<Self, TraceError> {
        let file = File::create(path)?;
        let mut writer = Self {
            out: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            op_count: 0,
        };
        writer.write_header(TraceHeader {
            op_count: 0,
            pq_ids,
            node_ids,
        })?;
        Ok(writer)
    }

    fn write_header(&mut self, header: TraceHeader) -> Result<(), TraceError> {
        self.out.write_u64::<LittleEndian>(header.op_count)?;
        self.out.write_u32::<LittleEndian>(header.pq_ids)?;
        self.out.write_u32::<LittleEndian>(header.node_ids)?;
        Ok(())
    }

    /// Append one operation record.
    pub fn write_op(&mut self, op: TraceOp) -> Result<(), TraceError> {
        self.out.write_u32::<LittleEndian>(op.code())?;
        match op {
            TraceOp::Create { pq_id }
            | TraceOp::Destroy { pq_id }
            | TraceOp::Clear { pq_id }
            | TraceOp::GetSize { pq_id }
            | TraceOp::FindMin { pq_id }
            | TraceOp::DeleteMin { pq_id }
            | TraceOp::Empty { pq_id } => {
                self.out.write_u32::<LittleEndian>(pq_id)?;
            }
            TraceOp::GetKey { pq_id, node_id }
            | TraceOp::GetItem { pq_id, node_id }
            | TraceOp::Delete { pq_id, node_id } => {
                self.out.write_u32::<LittleEndian>(pq_id)?;
                self.out.write_u32::<LittleEndian>(node_id)?;
            }
            TraceOp::Insert {
                pq_id,
                node_id,
                key,
                item,
            } => {
                self.out.write_u32::<LittleEndian>(pq_id)?;
                self.out.write_u32::<LittleEndian>(node_id)?;
                self.out.write_u64::<LittleEndian>(key)?;
                self.out.write_u32::<LittleEndian>(item)?;
            }
            TraceOp::DecreaseKey {
                pq_id,
                node_id,
                key,
            } => {
                self.out.write_u32::<LittleEndian>(pq_id)?;
                self.out.write_u32::<LittleEndian>(node_id)?;
                self.out.write_u64::<LittleEndian>(key)?;
            }
            TraceOp::Meld {
                pq_src1_id,
                pq_src2_id,
                pq_dst_id,
            } => {
                self.out.write_u32::<LittleEndian>(pq_src1_id)?;
                self.out.write_u32::<LittleEndian>(pq_src2_id)?;
                self.out.write_u32::<LittleEndian>(pq_dst_id)?;
            }
        }
        self.op_count += 1;
        Ok(())
    }

    /// Flush, rewrite the header with the final counts, flush again and
    /// close the file.
    pub fn finish(mut self, pq_ids: u32, node_ids: u32) -> Result<(), TraceError> {
        // Flush before seeking or the buffered tail lands after the
        // rewound cursor.
        self.out.flush()?;
        self.out.seek(SeekFrom::Start(0))?;
        let header = TraceHeader {
            op_count: self.op_count,
            pq_ids,
            node_ids,
        };
        log::debug!(
            "trace: rewriting header, {} ops, {} queues, {} nodes",
            header.op_count,
            header.pq_ids,
            header.node_ids
        );
        self.write_header(header)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Buffered trace reader.
pub struct TraceReader {
    input: BufReader<File>,
}

impl TraceReader {
    /// Open a trace file.
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        Ok(Self {
            input: BufReader::new(File::open(path)?),
        })
    }

    /// Read the header. Call once, before the first `read_op`.
    pub fn read_header(&mut self) -> Result<TraceHeader, TraceError> {
        Ok(TraceHeader {
            op_count: self.input.read_u64::<LittleEndian>()?,
            pq_ids: self.input.read_u32::<LittleEndian>()?,
            node_ids: self.input.read_u32::<LittleEndian>()?,
        })
    }

    /// Read the next record; `Ok(None)` at a clean end of file.
    pub fn read_op(&mut self) -> Result<Option<TraceOp>, TraceError> {
        let mut code_buf = [0u8; 4];
        match self.input.read_exact(&mut code_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let code = u32::from_le_bytes(code_buf);
        if TraceOp::wire_len(code).is_none() {
            return Err(TraceError::UnknownOpCode(code));
        }
        let input = &mut self.input;
        let op = match code {
            0 => TraceOp::Create {
                pq_id: input.read_u32::<LittleEndian>()?,
            },
            1 => TraceOp::Destroy {
                pq_id: input.read_u32::<LittleEndian>()?,
            },
            2 => TraceOp::Clear {
                pq_id: input.read_u32::<LittleEndian>()?,
            },
            3 => TraceOp::GetKey {
                pq_id: input.read_u32::<LittleEndian>()?,
                node_id: input.read_u32::<LittleEndian>()?,
            },
            4 => TraceOp::GetItem {
                pq_id: input.read_u32::<LittleEndian>()?,
                node_id: input.read_u32::<LittleEndian>()?,
            },
            5 => TraceOp::GetSize {
                pq_id: input.read_u32::<LittleEndian>()?,
            },
            6 => TraceOp::Insert {
                pq_id: input.read_u32::<LittleEndian>()?,
                node_id: input.read_u32::<LittleEndian>()?,
                key: input.read_u64::<LittleEndian>()?,
                item: input.read_u32::<LittleEndian>()?,
            },
            7 => TraceOp::FindMin {
                pq_id: input.read_u32::<LittleEndian>()?,
            },
            8 => TraceOp::Delete {
                pq_id: input.read_u32::<LittleEndian>()?,
                node_id: input.read_u32::<LittleEndian>()?,
            },
            9 => TraceOp::DeleteMin {
                pq_id: input.read_u32::<LittleEndian>()?,
            },
            10 => TraceOp::DecreaseKey {
                pq_id: input.read_u32::<LittleEndian>()?,
                node_id: input.read_u32::<LittleEndian>()?,
                key: input.read_u64::<LittleEndian>()?,
            },
            11 => TraceOp::Meld {
                pq_src1_id: input.read_u32::<LittleEndian>()?,
                pq_src2_id: input.read_u32::<LittleEndian>()?,
                pq_dst_id: input.read_u32::<LittleEndian>()?,
            },
            12 => TraceOp::Empty {
                pq_id: input.read_u32::<LittleEndian>()?,
            },
            _ => unreachable!("validated above"),
        };
        Ok(Some(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_ops() -> Vec<TraceOp> {
        vec![
            TraceOp::Create { pq_id: 0 },
            TraceOp::Insert {
                pq_id: 0,
                node_id: 0,
                key: 0xDEAD_BEEF_0000_0001,
                item: 42,
            },
            TraceOp::Insert {
                pq_id: 0,
                node_id: 1,
                key: 3,
                item: 7,
            },
            TraceOp::FindMin { pq_id: 0 },
            TraceOp::DecreaseKey {
                pq_id: 0,
                node_id: 0,
                key: 1,
            },
            TraceOp::GetKey {
                pq_id: 0,
                node_id: 1,
            },
            TraceOp::GetItem {
                pq_id: 0,
                node_id: 1,
            },
            TraceOp::GetSize { pq_id: 0 },
            TraceOp::DeleteMin { pq_id: 0 },
            TraceOp::Delete {
                pq_id: 0,
                node_id: 1,
            },
            TraceOp::Empty { pq_id: 0 },
            TraceOp::Meld {
                pq_src1_id: 0,
                pq_src2_id: 1,
                pq_dst_id: 2,
            },
            TraceOp::Clear { pq_id: 2 },
            TraceOp::Destroy { pq_id: 2 },
        ]
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ops.trace");
        let ops = sample_ops();

        let mut w = TraceWriter::create(&path, 3, 2).unwrap();
        for &op in &ops {
            w.write_op(op).unwrap();
        }
        w.finish(3, 2).unwrap();

        let mut r = TraceReader::open(&path).unwrap();
        let header = r.read_header().unwrap();
        assert_eq!(header.op_count, ops.len() as u64);
        assert_eq!(header.pq_ids, 3);
        assert_eq!(header.node_ids, 2);
        let mut got = Vec::new();
        while let Some(op) = r.read_op().unwrap() {
            got.push(op);
        }
        assert_eq!(got, ops);
    }

    #[test]
    fn test_header_rewrite_counts_ops() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("counted.trace");
        let mut w = TraceWriter::create(&path, 1, 0).unwrap();
        for _ in 0..1000 {
            w.write_op(TraceOp::FindMin { pq_id: 0 }).unwrap();
        }
        w.finish(1, 0).unwrap();

        let mut r = TraceReader::open(&path).unwrap();
        assert_eq!(r.read_header().unwrap().op_count, 1000);
    }

    #[test]
    fn test_wire_lengths_match_encoding() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("len.trace");
        let ops = sample_ops();
        let mut w = TraceWriter::create(&path, 3, 2).unwrap();
        for &op in &ops {
            w.write_op(op).unwrap();
        }
        w.finish(3, 2).unwrap();

        let expect: usize = 16 + ops
            .iter()
            .map(|op| TraceOp::wire_len(op.code()).unwrap())
            .sum::<usize>();
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, expect);
    }

    #[test]
    fn test_unknown_op_code() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.trace");
        {
            let mut w = TraceWriter::create(&path, 0, 0).unwrap();
            w.finish(0, 0).unwrap();
        }
        // Append a record with an out-of-table code.
        use std::io::Write as _;
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&99u32.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        drop(f);

        let mut r = TraceReader::open(&path).unwrap();
        r.read_header().unwrap();
        match r.read_op() {
            Err(TraceError::UnknownOpCode(99)) => {}
            other => panic!("expected UnknownOpCode, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_record_is_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trunc.trace");
        {
            let mut w = TraceWriter::create(&path, 1, 1).unwrap();
            w.finish(1, 1).unwrap();
        }
        use std::io::Write as _;
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        // An insert record cut off after the code and pq_id.
        f.write_all(&6u32.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        drop(f);

        let mut r = TraceReader::open(&path).unwrap();
        r.read_header().unwrap();
        assert!(matches!(r.read_op(), Err(TraceError::Io(_))));
    }

    #[test]
    fn test_unfinished_trace_reads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unfinished.trace");
        {
            let mut w = TraceWriter::create(&path, 1, 1).unwrap();
            w.write_op(TraceOp::Create { pq_id: 0 }).unwrap();
            // Dropped without finish: header still says zero ops.
            let _ = w;
        }
        let mut r = TraceReader::open(&path).unwrap();
        assert_eq!(r.read_header().unwrap().op_count, 0);
    }
}
