//! B-tree page traversal.
//!
//! Table b-trees (page types 0x05/0x0D) yield `(rowid, record)` pairs in
//! rowid order. Index b-trees (0x02/0x0A), which store `WITHOUT ROWID`
//! tables, yield records in key order.

use std::collections::HashSet;

use super::header::{be_u16, be_u32, DatabaseHeader, HEADER_SIZE};
use super::record::read_varint;
use super::SqliteError;

const INTERIOR_INDEX: u8 = 0x02;
const INTERIOR_TABLE: u8 = 0x05;
const LEAF_INDEX: u8 = 0x0a;
const LEAF_TABLE: u8 = 0x0d;

/// Deeper trees cannot exist in a file addressable by 32-bit page numbers.
const MAX_DEPTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    Table,
    Index,
}

/// One traversal over a database file.
///
/// Every page may be visited at most once, which rejects cyclic
/// child or overflow pointers.
pub struct Walker<'a> {
    file: &'a [u8],
    header: DatabaseHeader,
    visited: HashSet<u32>,
}

impl<'a> Walker<'a> {
    pub fn new(file: &'a [u8], header: DatabaseHeader) -> Self {
        Self {
            file,
            header,
            visited: HashSet::new(),
        }
    }

    /// Visit every entry below `root`, calling `f(rowid, payload)`.
    ///
    /// `rowid` is `None` for index trees.
    pub fn walk<E, F>(&mut self, root: u32, kind: TreeKind, f: &mut F) -> Result<(), E>
    where
        E: From<SqliteError>,
        F: FnMut(Option<i64>, Vec<u8>) -> Result<(), E>,
    {
        self.walk_page(root, kind, 0, f)
    }

    fn page(&mut self, number: u32) -> Result<&'a [u8], SqliteError> {
        if number == 0 || number > self.header.page_count {
            return Err(SqliteError::BadPage {
                page: number,
                reason: format!("page number out of range 1..={}", self.header.page_count),
            });
        }
        if !self.visited.insert(number) {
            return Err(SqliteError::BadPage {
                page: number,
                reason: "page referenced twice".into(),
            });
        }
        let start = (number as usize - 1) * self.header.page_size;
        let file: &'a [u8] = self.file;
        file.get(start..start + self.header.usable_size)
            .ok_or(SqliteError::Truncated(format!("page {} past end of file", number)))
    }

    fn walk_page<E, F>(&mut self, number: u32, kind: TreeKind, depth: usize, f: &mut F) -> Result<(), E>
    where
        E: From<SqliteError>,
        F: FnMut(Option<i64>, Vec<u8>) -> Result<(), E>,
    {
        if depth > MAX_DEPTH {
            return Err(bad_page(number, "b-tree too deep").into());
        }
        let page = self.page(number)?;
        let offset = if number == 1 { HEADER_SIZE } else { 0 };
        let page_type = *page.get(offset).ok_or_else(|| bad_page(number, "empty page"))?;

        let interior = match (kind, page_type) {
            (TreeKind::Table, LEAF_TABLE) | (TreeKind::Index, LEAF_INDEX) => false,
            (TreeKind::Table, INTERIOR_TABLE) | (TreeKind::Index, INTERIOR_INDEX) => true,
            _ => {
                return Err(bad_page(number, &format!("unexpected page type {:#04x}", page_type)).into())
            }
        };

        let header_len = if interior { 12 } else { 8 };
        if offset + header_len > page.len() {
            return Err(bad_page(number, "page header truncated").into());
        }
        let cell_count = usize::from(be_u16(page, offset + 3));
        let pointers = offset + header_len;
        if pointers + cell_count * 2 > page.len() {
            return Err(bad_page(number, "cell pointer array overruns page").into());
        }

        for i in 0..cell_count {
            let cell = usize::from(be_u16(page, pointers + i * 2));
            if cell < pointers + cell_count * 2 || cell >= page.len() {
                return Err(bad_page(number, &format!("cell pointer {} outside content area", cell)).into());
            }

            match (kind, interior) {
                (TreeKind::Table, false) => {
                    let (payload_len, n) = read_varint(page, cell)?;
                    let (rowid, m) = read_varint(page, cell + n)?;
                    let payload = self.payload(number, page, cell + n + m, payload_len, true)?;
                    f(Some(rowid as i64), payload)?;
                }
                (TreeKind::Table, true) => {
                    let child = read_child(page, number, cell)?;
                    self.walk_page(child, kind, depth + 1, f)?;
                }
                (TreeKind::Index, false) => {
                    let (payload_len, n) = read_varint(page, cell)?;
                    let payload = self.payload(number, page, cell + n, payload_len, false)?;
                    f(None, payload)?;
                }
                (TreeKind::Index, true) => {
                    let child = read_child(page, number, cell)?;
                    self.walk_page(child, kind, depth + 1, f)?;
                    let (payload_len, n) = read_varint(page, cell + 4)?;
                    let payload = self.payload(number, page, cell + 4 + n, payload_len, false)?;
                    f(None, payload)?;
                }
            }
        }

        if interior {
            let right = be_u32(page, offset + 8);
            self.walk_page(right, kind, depth + 1, f)?;
        }
        Ok(())
    }

    /// Assemble a cell payload, following its overflow chain.
    fn payload(
        &mut self,
        number: u32,
        page: &[u8],
        start: usize,
        payload_len: u64,
        table_leaf: bool,
    ) -> Result<Vec<u8>, SqliteError> {
        let total = usize::try_from(payload_len)
            .ok()
            .filter(|&n| n <= self.file.len())
            .ok_or_else(|| bad_page(number, &format!("payload length {} exceeds file", payload_len)))?;
        let local = self.local_size(total, table_leaf);

        let mut payload = Vec::with_capacity(total);
        payload.extend_from_slice(
            page.get(start..start + local)
                .ok_or_else(|| bad_page(number, "cell payload overruns page"))?,
        );
        if local == total {
            return Ok(payload);
        }

        let mut next = be_u32(
            page.get(start + local..start + local + 4)
                .ok_or_else(|| bad_page(number, "overflow pointer overruns page"))?,
            0,
        );
        while payload.len() < total {
            let overflow = self.page(next)?;
            let take = (total - payload.len()).min(overflow.len() - 4);
            payload.extend_from_slice(&overflow[4..4 + take]);
            next = be_u32(overflow, 0);
            if payload.len() < total && next == 0 {
                return Err(SqliteError::Truncated(format!(
                    "overflow chain from page {} ends early",
                    number
                )));
            }
        }
        Ok(payload)
    }

    fn local_size(&self, total: usize, table_leaf: bool) -> usize {
        let usable = self.header.usable_size;
        let max_local = if table_leaf {
            usable - 35
        } else {
            (usable - 12) * 64 / 255 - 23
        };
        if total <= max_local {
            return total;
        }
        let min_local = (usable - 12) * 32 / 255 - 23;
        let k = min_local + (total - min_local) % (usable - 4);
        if k <= max_local {
            k
        } else {
            min_local
        }
    }
}

fn read_child(page: &[u8], number: u32, cell: usize) -> Result<u32, SqliteError> {
    if cell + 4 > page.len() {
        return Err(bad_page(number, "child pointer overruns page"));
    }
    Ok(be_u32(page, cell))
}

fn bad_page(page: u32, reason: &str) -> SqliteError {
    SqliteError::BadPage {
        page,
        reason: reason.to_string(),
    }
}
