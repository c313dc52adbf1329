//! Minimal read-only SQLite reader.
//!
//! Supports exactly what importing a collection needs: header validation,
//! the `sqlite_master` catalogue, and full scans of rowid and
//! `WITHOUT ROWID` tables. There is no query engine; callers scan a table
//! and filter rows themselves.

mod btree;
mod header;
mod record;
mod table;

use std::borrow::Cow;
use std::collections::HashMap;

use thiserror::Error;

use btree::{TreeKind, Walker};
pub use header::DatabaseHeader;
pub use record::Value;
pub use table::TableLayout;

/// Structural problems found while reading a database file.
#[derive(Debug, Error)]
pub enum SqliteError {
    #[error("not a SQLite database")]
    BadMagic,

    #[error("invalid page size {0}")]
    BadPageSize(usize),

    #[error("truncated database: {0}")]
    Truncated(String),

    #[error("invalid header: {0}")]
    BadHeader(String),

    #[error("unsupported text encoding {0}")]
    UnsupportedEncoding(u32),

    #[error("page {page}: {reason}")]
    BadPage { page: u32, reason: String },

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("invalid schema: {0}")]
    BadSchema(String),

    #[error("missing table {0}")]
    MissingTable(String),

    #[error("table {table} has no column {column}")]
    MissingColumn { table: String, column: String },

    #[error("column {column} holds {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
}

type Result<T> = std::result::Result<T, SqliteError>;

const MASTER_COLUMNS: [&str; 5] = ["type", "name", "tbl_name", "rootpage", "sql"];

#[derive(Debug, Clone)]
struct TableInfo {
    name: String,
    root_page: u32,
    layout: TableLayout,
}

/// An opened database file.
pub struct Database {
    file: Vec<u8>,
    header: DatabaseHeader,
    tables: HashMap<String, TableInfo>,
}

impl Database {
    /// Validate the header and load the table catalogue.
    pub fn open(file: Vec<u8>) -> Result<Self> {
        let header = DatabaseHeader::parse(&file)?;
        let master = TableInfo {
            name: "sqlite_master".to_string(),
            root_page: 1,
            layout: TableLayout {
                columns: MASTER_COLUMNS.iter().map(|c| c.to_string()).collect(),
                rowid_alias: None,
                without_rowid: false,
                storage_order: (0..MASTER_COLUMNS.len()).collect(),
            },
        };

        let mut tables = HashMap::new();
        scan_table(&file, header, &master, &mut |row: Row<'_>| -> Result<()> {
            if row.text("type")? != "table" {
                return Ok(());
            }
            let name = row.text("name")?.into_owned();
            let root = row.integer("rootpage")?;
            if root == 0 {
                // virtual tables have no b-tree
                return Ok(());
            }
            let root_page = u32::try_from(root)
                .ok()
                .filter(|&p| p > 0)
                .ok_or_else(|| SqliteError::BadSchema(format!("table {} has root page {}", name, root)))?;
            let layout = TableLayout::parse(&row.text("sql")?)?;
            tables.insert(
                name.to_ascii_lowercase(),
                TableInfo {
                    name,
                    root_page,
                    layout,
                },
            );
            Ok(())
        })?;

        tracing::debug!(
            page_size = header.page_size,
            pages = header.page_count,
            tables = tables.len(),
            "opened collection database"
        );
        Ok(Self {
            file,
            header,
            tables,
        })
    }

    pub fn header(&self) -> DatabaseHeader {
        self.header
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    /// Call `f` for every row of `table`, in storage order.
    ///
    /// Stops at the first error returned by `f`.
    pub fn scan<E, F>(&self, table: &str, mut f: F) -> std::result::Result<(), E>
    where
        E: From<SqliteError>,
        F: FnMut(Row<'_>) -> std::result::Result<(), E>,
    {
        let info = self
            .tables
            .get(&table.to_ascii_lowercase())
            .ok_or_else(|| SqliteError::MissingTable(table.to_string()))?;
        scan_table(&self.file, self.header, info, &mut f)
    }
}

fn scan_table<E, F>(
    file: &[u8],
    header: DatabaseHeader,
    info: &TableInfo,
    f: &mut F,
) -> std::result::Result<(), E>
where
    E: From<SqliteError>,
    F: FnMut(Row<'_>) -> std::result::Result<(), E>,
{
    let layout = &info.layout;
    let kind = if layout.without_rowid {
        TreeKind::Index
    } else {
        TreeKind::Table
    };
    let mut visit = |rowid: Option<i64>, payload: Vec<u8>| -> std::result::Result<(), E> {
        let record = record::decode_record(&payload)?;
        let mut values = vec![Value::Null; layout.columns.len()];
        for (position, value) in record.into_iter().enumerate() {
            if let Some(&column) = layout.storage_order.get(position) {
                values[column] = value;
            }
        }
        if let (Some(alias), Some(rowid)) = (layout.rowid_alias, rowid) {
            values[alias] = Value::Integer(rowid);
        }
        f(Row {
            table: &info.name,
            layout,
            rowid,
            values,
        })
    };
    Walker::new(file, header).walk(info.root_page, kind, &mut visit)
}

/// One decoded row, with typed access by column name.
#[derive(Debug)]
pub struct Row<'a> {
    table: &'a str,
    layout: &'a TableLayout,
    rowid: Option<i64>,
    values: Vec<Value>,
}

impl<'a> Row<'a> {
    pub fn rowid(&self) -> Option<i64> {
        self.rowid
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.layout.column_index(column).is_some()
    }

    pub fn value(&self, column: &str) -> Result<&Value> {
        self.layout
            .column_index(column)
            .map(|i| &self.values[i])
            .ok_or_else(|| SqliteError::MissingColumn {
                table: self.table.to_string(),
                column: column.to_string(),
            })
    }

    /// Integer value; numeric text is accepted as SQLite's affinity would.
    pub fn integer(&self, column: &str) -> Result<i64> {
        let value = self.value(column)?;
        match value {
            Value::Integer(n) => Ok(*n),
            Value::Real(f) => Ok(*f as i64),
            Value::Text(s) => s.trim().parse().map_err(|_| self.mismatch(column, "integer", value)),
            _ => Err(self.mismatch(column, "integer", value)),
        }
    }

    /// Text value; blobs are read as UTF-8, NULL as the empty string.
    pub fn text(&self, column: &str) -> Result<Cow<'_, str>> {
        Ok(match self.value(column)? {
            Value::Text(s) => Cow::Borrowed(s.as_str()),
            Value::Blob(b) => String::from_utf8_lossy(b),
            Value::Integer(n) => Cow::Owned(n.to_string()),
            Value::Real(f) => Cow::Owned(f.to_string()),
            Value::Null => Cow::Borrowed(""),
        })
    }

    pub fn blob(&self, column: &str) -> Result<&[u8]> {
        let value = self.value(column)?;
        match value {
            Value::Blob(b) => Ok(b),
            Value::Text(s) => Ok(s.as_bytes()),
            Value::Null => Ok(&[]),
            _ => Err(self.mismatch(column, "blob", value)),
        }
    }

    fn mismatch(&self, column: &str, expected: &'static str, found: &Value) -> SqliteError {
        SqliteError::TypeMismatch {
            column: format!("{}.{}", self.table, column),
            expected,
            found: found.type_name(),
        }
    }
}
