//! The 100-byte database file header.

use super::SqliteError;

pub const HEADER_SIZE: usize = 100;
const MAGIC: &[u8; 16] = b"SQLite format 3\0";
const MIN_USABLE_SIZE: usize = 480;

/// Layout facts the page reader needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseHeader {
    pub page_size: usize,
    pub usable_size: usize,
    pub page_count: u32,
}

impl DatabaseHeader {
    /// Validate the header against the full file contents.
    pub fn parse(file: &[u8]) -> Result<Self, SqliteError> {
        let header = file
            .get(..HEADER_SIZE)
            .ok_or(SqliteError::Truncated("file shorter than header".into()))?;
        if &header[..16] != MAGIC {
            return Err(SqliteError::BadMagic);
        }

        let page_size = match be_u16(header, 16) {
            1 => 65_536,
            n => usize::from(n),
        };
        if !(512..=65_536).contains(&page_size) || !page_size.is_power_of_two() {
            return Err(SqliteError::BadPageSize(page_size));
        }

        // Read version 2 means WAL; the main file is still self-contained
        // once checkpointed, which is how exports are written.
        if header[19] > 2 {
            return Err(SqliteError::BadHeader(format!(
                "unsupported read version {}",
                header[19]
            )));
        }

        let reserved = usize::from(header[20]);
        let usable_size = page_size - reserved.min(page_size);
        if usable_size < MIN_USABLE_SIZE {
            return Err(SqliteError::BadHeader(format!(
                "usable page size {} below minimum",
                usable_size
            )));
        }

        if header[21..24] != [64, 32, 32] {
            return Err(SqliteError::BadHeader("invalid payload fractions".into()));
        }

        let encoding = be_u32(header, 56);
        if encoding > 1 {
            return Err(SqliteError::UnsupportedEncoding(encoding));
        }

        if file.len() % page_size != 0 {
            return Err(SqliteError::Truncated(format!(
                "file length {} is not a multiple of page size {}",
                file.len(),
                page_size
            )));
        }
        let file_pages = u32::try_from(file.len() / page_size)
            .map_err(|_| SqliteError::BadHeader("too many pages".into()))?;

        let change_counter = be_u32(header, 24);
        let declared_pages = be_u32(header, 28);
        let valid_for = be_u32(header, 92);
        let page_count = if declared_pages != 0 && valid_for == change_counter {
            if declared_pages > file_pages {
                return Err(SqliteError::Truncated(format!(
                    "header declares {} pages but file holds {}",
                    declared_pages, file_pages
                )));
            }
            declared_pages
        } else {
            file_pages
        };

        Ok(Self {
            page_size,
            usable_size,
            page_count,
        })
    }
}

pub fn be_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([buf[pos], buf[pos + 1]])
}

pub fn be_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}
