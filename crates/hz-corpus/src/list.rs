//! Newline-delimited path lists

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{CorpusError, CorpusResult};

/// Iterator over the paths of a list file, one per line.
///
/// Lines are trimmed and blank lines skipped. A read error (including a line
/// that is not valid UTF-8) is yielded as `CorpusError::PathList` and ends
/// the list.
pub struct PathList<R> {
    lines: std::io::Lines<BufReader<R>>,
    line: usize,
    failed: bool,
}

impl PathList<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> CorpusResult<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> PathList<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            line: 0,
            failed: false,
        }
    }
}

impl<R: Read> Iterator for PathList<R> {
    type Item = CorpusResult<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            self.line += 1;
            match self.lines.next()? {
                Ok(line) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        return Some(Ok(PathBuf::from(trimmed)));
                    }
                }
                Err(e) => {
                    warn!("Path list unreadable at line {}: {}", self.line, e);
                    self.failed = true;
                    return Some(Err(CorpusError::PathList {
                        line: self.line,
                        source: e,
                    }));
                }
            }
        }
    }
}
