//! Column layout recovered from `CREATE TABLE` statements.

use super::SqliteError;

/// How a table's rows map onto stored records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub columns: Vec<String>,
    /// Column that aliases the rowid (`INTEGER PRIMARY KEY`).
    pub rowid_alias: Option<usize>,
    pub without_rowid: bool,
    /// Column index for each record position.
    pub storage_order: Vec<usize>,
}

impl TableLayout {
    pub fn parse(sql: &str) -> Result<Self, SqliteError> {
        let sql = strip_comments(sql);
        let sql = sql.as_str();
        let open = sql.find('(');
        let close = sql.rfind(')');
        let (open, close) = match (open, close) {
            (Some(o), Some(c)) if o < c => (o, c),
            _ => return Err(SqliteError::BadSchema(format!("unparseable table sql: {}", sql))),
        };
        let without_rowid = sql[close + 1..]
            .to_ascii_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .windows(2)
            .any(|w| w == ["without", "rowid"]);

        let mut columns = Vec::new();
        let mut column_pk = Vec::new();
        let mut table_pk: Vec<String> = Vec::new();
        let mut rowid_alias = None;

        for def in split_top_level(&sql[open + 1..close]) {
            let def = def.trim();
            if def.is_empty() {
                continue;
            }
            let lower = def.to_ascii_lowercase();
            let first = lower.split_whitespace().next().unwrap_or("");
            if matches!(first, "primary" | "unique" | "check" | "foreign" | "constraint") {
                if lower.contains("primary key") {
                    table_pk = constraint_columns(def);
                }
                continue;
            }

            let (name, rest) = take_identifier(def);
            let rest_lower = rest.to_ascii_lowercase();
            let is_pk = rest_lower.contains("primary key");
            let type_name = rest_lower.split_whitespace().next().unwrap_or("");
            let descending = rest_lower.split_whitespace().any(|w| w == "desc");
            if is_pk && type_name == "integer" && !descending {
                rowid_alias = Some(columns.len());
            }
            if is_pk {
                column_pk.push(name.clone());
            }
            columns.push(name);
        }

        if columns.is_empty() {
            return Err(SqliteError::BadSchema(format!("table without columns: {}", sql)));
        }

        let storage_order = if without_rowid {
            let pk = if table_pk.is_empty() { column_pk } else { table_pk };
            let mut order: Vec<usize> = Vec::with_capacity(columns.len());
            for key in &pk {
                let idx = columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(key))
                    .ok_or_else(|| {
                        SqliteError::BadSchema(format!("primary key names unknown column {}", key))
                    })?;
                order.push(idx);
            }
            for idx in 0..columns.len() {
                if !order.contains(&idx) {
                    order.push(idx);
                }
            }
            order
        } else {
            (0..columns.len()).collect()
        };

        Ok(Self {
            columns,
            rowid_alias: if without_rowid { None } else { rowid_alias },
            without_rowid,
            storage_order,
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Remove `/* */` and `--` comments outside of quoted text.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            out.push(ch);
            continue;
        }
        match (ch, chars.peek()) {
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            ('-', Some('-')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
                out.push('\n');
            }
            _ => {
                if matches!(ch, '\'' | '"' | '`') {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

/// Split on commas that are not nested in parentheses or quotes.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in body.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '[' => quote = Some(']'),
                '(' => depth += 1,
                ')' => depth -= 1,
                ',' if depth == 0 => {
                    parts.push(&body[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&body[start..]);
    parts
}

/// Leading identifier of a column definition, unquoted, and the remainder.
fn take_identifier(def: &str) -> (String, &str) {
    let closing = match def.chars().next() {
        Some('"') => Some('"'),
        Some('`') => Some('`'),
        Some('[') => Some(']'),
        Some('\'') => Some('\''),
        _ => None,
    };
    match closing {
        Some(close) => match def[1..].find(close) {
            Some(end) => (def[1..end + 1].to_string(), &def[end + 2..]),
            None => (def[1..].to_string(), ""),
        },
        None => {
            let end = def.find(char::is_whitespace).unwrap_or(def.len());
            (def[..end].to_string(), &def[end..])
        }
    }
}

/// Column names listed in a `PRIMARY KEY (a, b)` table constraint.
fn constraint_columns(def: &str) -> Vec<String> {
    let (Some(open), Some(close)) = (def.find('('), def.rfind(')')) else {
        return Vec::new();
    };
    def[open + 1..close]
        .split(',')
        .filter_map(|part| {
            let (name, _) = take_identifier(part.trim());
            (!name.is_empty()).then_some(name)
        })
        .collect()
}
