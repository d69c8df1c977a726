use std::{
    fs,
    io::{self, BufRead, BufReader, Read},
    mem,
    path::Path,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender};
use thiserror::Error;
use tracing::debug;
use xz2::read::XzDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
    InstrFetch,
}

impl AccessKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AccessKind::Read),
            1 => Some(AccessKind::Write),
            2 => Some(AccessKind::InstrFetch),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AccessKind::Read => 0,
            AccessKind::Write => 1,
            AccessKind::InstrFetch => 2,
        }
    }

    /// Only data writes dirty a block.
    pub fn is_write(self) -> bool {
        self == AccessKind::Write
    }
}

/// One trace record. `aux` is carried through but never used by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub kind: AccessKind,
    pub addr: u64,
    pub aux: u64,
}

impl Access {
    pub fn new(kind: AccessKind, addr: u64) -> Self {
        Access { kind, addr, aux: 0 }
    }
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("could not read trace: {0}")]
    Io(#[from] io::Error),
    #[error("trace line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("trace reader thread panicked")]
    ReaderPanicked,
}

fn parse_hex(field: &str) -> Option<u64> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u64::from_str_radix(digits, 16).ok()
}

/// Parses `<type> <hex address> [<hex aux>]`. Blank lines give `Ok(None)`,
/// and anything after the aux field is rejected.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<Access>, TraceError> {
    let malformed = |reason: String| TraceError::Malformed {
        line: line_no,
        reason,
    };
    let mut fields = line.split_whitespace();
    let Some(kind_field) = fields.next() else {
        return Ok(None);
    };

    let kind = kind_field
        .parse::<u8>()
        .ok()
        .and_then(AccessKind::from_code)
        .ok_or_else(|| malformed(format!("unknown access type {kind_field:?}")))?;
    let addr_field = fields
        .next()
        .ok_or_else(|| malformed("missing address".to_string()))?;
    let addr =
        parse_hex(addr_field).ok_or_else(|| malformed(format!("bad address {addr_field:?}")))?;
    let aux = match fields.next() {
        Some(field) => {
            parse_hex(field).ok_or_else(|| malformed(format!("bad aux field {field:?}")))?
        }
        None => 0,
    };
    if let Some(extra) = fields.next() {
        return Err(malformed(format!("unexpected field {extra:?}")));
    }

    Ok(Some(Access { kind, addr, aux }))
}

pub type Batch = Result<Vec<Access>, TraceError>;

/// Trace records parsed on a background thread and handed over in blocks.
///
/// The channel closes once the input is exhausted. A parse or read error is
/// sent as the last item.
pub struct Trace {
    pub rec: Receiver<Batch>,
    thread: JoinHandle<()>,
}

impl Trace {
    /// Opens a trace file, decompressing it on the fly if it ends in `.xz`.
    pub fn open(
        path: &Path,
        records_per_block: usize,
        blocks_per_queue: usize,
    ) -> io::Result<Trace> {
        let file = fs::File::open(path)?;
        let compressed = path.extension().is_some_and(|ext| ext == "xz");
        debug!(path = %path.display(), compressed, "opened trace");

        let stream: Box<dyn Read + Send> = if compressed {
            Box::new(XzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(Trace::from_reader(stream, records_per_block, blocks_per_queue))
    }

    pub fn from_reader<R: Read + Send + 'static>(
        stream: R,
        records_per_block: usize,
        blocks_per_queue: usize,
    ) -> Trace {
        let records_per_block = records_per_block.max(1);
        let (sender, receiver) = channel::bounded(blocks_per_queue);

        let t = thread::spawn(move || Trace::run_thread(stream, records_per_block, sender));

        Trace {
            rec: receiver,
            thread: t,
        }
    }

    fn run_thread<R: Read>(stream: R, records_per_block: usize, queue: Sender<Batch>) {
        let mut buffer = Vec::with_capacity(records_per_block);
        for (idx, line) in BufReader::new(stream).lines().enumerate() {
            let parsed = line
                .map_err(TraceError::from)
                .and_then(|line| parse_line(idx + 1, &line));
            match parsed {
                Ok(Some(access)) => buffer.push(access),
                Ok(None) => continue,
                Err(err) => {
                    if !buffer.is_empty() && queue.send(Ok(mem::take(&mut buffer))).is_err() {
                        return;
                    }
                    let _ = queue.send(Err(err));
                    return;
                }
            }

            if buffer.len() == records_per_block {
                let full = mem::replace(&mut buffer, Vec::with_capacity(records_per_block));
                // Receiver gone: the driver stopped early
                if queue.send(Ok(full)).is_err() {
                    return;
                }
            }
        }
        if !buffer.is_empty() {
            let _ = queue.send(Ok(buffer));
        }
    }

    pub fn blocks(&self) -> channel::Iter<'_, Batch> {
        self.rec.iter()
    }

    /// Stops reading and waits for the reader thread.
    pub fn finish(self) -> Result<(), TraceError> {
        let Trace { rec, thread } = self;
        drop(rec);
        thread.join().map_err(|_| TraceError::ReaderPanicked)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn collect(text: &'static str, per_block: usize) -> (Vec<Vec<Access>>, Option<TraceError>) {
        let trace = Trace::from_reader(Cursor::new(text), per_block, 2);
        let mut blocks = Vec::new();
        let mut error = None;
        for batch in trace.blocks() {
            match batch {
                Ok(block) => blocks.push(block),
                Err(err) => error = Some(err),
            }
        }
        trace.finish().unwrap();
        (blocks, error)
    }

    #[test]
    fn parses_records() {
        assert_eq!(
            parse_line(1, "0 7fff5a8487c8 4005b8").unwrap(),
            Some(Access {
                kind: AccessKind::Read,
                addr: 0x7fff5a8487c8,
                aux: 0x4005b8
            })
        );
        assert_eq!(
            parse_line(2, "1 0x10 0x0").unwrap(),
            Some(Access::new(AccessKind::Write, 0x10))
        );
        assert_eq!(
            parse_line(3, "2\tABCD").unwrap(),
            Some(Access::new(AccessKind::InstrFetch, 0xabcd))
        );
        assert_eq!(parse_line(4, "   ").unwrap(), None);
    }

    #[test]
    fn rejects_malformed_records() {
        assert!(matches!(
            parse_line(7, "3 10 0"),
            Err(TraceError::Malformed { line: 7, .. })
        ));
        assert!(matches!(
            parse_line(1, "r 10 0"),
            Err(TraceError::Malformed { .. })
        ));
        assert!(matches!(parse_line(1, "0"), Err(TraceError::Malformed { .. })));
        assert!(matches!(
            parse_line(1, "0 xyz 0"),
            Err(TraceError::Malformed { .. })
        ));
        assert!(matches!(
            parse_line(1, "0 10 zz"),
            Err(TraceError::Malformed { .. })
        ));
        assert!(matches!(
            parse_line(5, "0 10 0 junk"),
            Err(TraceError::Malformed { line: 5, .. })
        ));
    }

    #[test]
    fn access_codes() {
        for kind in [AccessKind::Read, AccessKind::Write, AccessKind::InstrFetch] {
            assert_eq!(AccessKind::from_code(kind.code()), Some(kind));
        }
        assert!(AccessKind::Write.is_write());
        assert!(!AccessKind::Read.is_write());
        assert!(!AccessKind::InstrFetch.is_write());
    }

    #[test]
    fn reader_batches_records() {
        let (blocks, error) = collect("0 0 0\n1 4 0\n\n2 8 0\n0 c 0\n0 10 0\n", 2);
        assert!(error.is_none());
        let sizes: Vec<usize> = blocks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let addrs: Vec<u64> = blocks.concat().iter().map(|a| a.addr).collect();
        assert_eq!(addrs, vec![0x0, 0x4, 0x8, 0xc, 0x10]);
    }

    #[test]
    fn reader_stops_at_bad_line() {
        let (blocks, error) = collect("0 0 0\n0 4 0\n9 8 0\n0 c 0\n", 16);
        assert_eq!(blocks.concat().len(), 2);
        assert!(matches!(error, Some(TraceError::Malformed { line: 3, .. })));
    }

    #[test]
    fn empty_trace_yields_nothing() {
        let (blocks, error) = collect("", 4);
        assert!(blocks.is_empty());
        assert!(error.is_none());
    }
}
