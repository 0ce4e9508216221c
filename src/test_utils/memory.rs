use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::driver::{ConnectionFactory, DriverConnection, ExecResult};
use crate::error::QuerysetError;
use crate::results::ResultSet;
use crate::types::SqlValue;

#[derive(Debug, Default)]
struct MemoryTable {
    next_id: i64,
    rows: BTreeMap<i64, BTreeMap<String, SqlValue>>,
}

#[derive(Default)]
struct ServerState {
    tables: Mutex<HashMap<String, MemoryTable>>,
    failing_pings: AtomicUsize,
    connects: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
}

/// An in-memory stand-in for the database server. Cheap to clone handles
/// around; all connections from [`MemoryServer::factory`] share its state.
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<ServerState>,
}

impl MemoryServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str) {
        self.tables().insert(
            name.to_string(),
            MemoryTable {
                next_id: 1,
                rows: BTreeMap::new(),
            },
        );
    }

    #[must_use]
    pub fn factory(&self) -> Arc<MemoryFactory> {
        Arc::new(MemoryFactory {
            state: Arc::clone(&self.state),
        })
    }

    /// Make the next `n` liveness probes fail, across all connections.
    pub fn fail_next_pings(&self, n: usize) {
        self.state.failing_pings.store(n, Ordering::SeqCst);
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn rollback_count(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Direct row inspection for assertions.
    #[must_use]
    pub fn row(&self, table: &str, id: i64) -> Option<BTreeMap<String, SqlValue>> {
        self.tables()
            .get(table)
            .and_then(|t| t.rows.get(&id).cloned())
    }

    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables().get(table).map_or(0, |t| t.rows.len())
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryTable>> {
        self.state
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Factory handing out connections to one [`MemoryServer`].
pub struct MemoryFactory {
    state: Arc<ServerState>,
}

#[async_trait]
impl ConnectionFactory for MemoryFactory {
    async fn connect(&self) -> Result<Box<dyn DriverConnection>, QuerysetError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

/// One session against the in-memory server.
pub struct MemoryConnection {
    state: Arc<ServerState>,
}

#[async_trait]
impl DriverConnection for MemoryConnection {
    async fn ping(&mut self) -> Result<(), QuerysetError> {
        let remaining = &self.state.failing_pings;
        loop {
            let n = remaining.load(Ordering::SeqCst);
            if n == 0 {
                return Ok(());
            }
            if remaining
                .compare_exchange(n, n - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(QuerysetError::Connection("ping failed".to_string()));
            }
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<ExecResult, QuerysetError> {
        let mut tables = self
            .state
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        run_execute(&mut tables, sql)
    }

    async fn query(&mut self, sql: &str) -> Result<ResultSet, QuerysetError> {
        let tables = self
            .state
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        run_query(&tables, sql)
    }

    async fn commit(&mut self) -> Result<(), QuerysetError> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), QuerysetError> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), QuerysetError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type Tables = HashMap<String, MemoryTable>;

fn run_execute(tables: &mut Tables, sql: &str) -> Result<ExecResult, QuerysetError> {
    let sql = sql.trim();
    if let Some(rest) = eat_ci(sql, "INSERT INTO ") {
        return run_insert(tables, rest);
    }
    if let Some(rest) = eat_ci(sql, "UPDATE ") {
        return run_update(tables, rest);
    }
    if let Some(rest) = eat_ci(sql, "DELETE FROM ") {
        return run_delete(tables, rest);
    }
    if eat_ci(sql, "SET NAMES").is_some() || eat_ci(sql, "SET CHARACTER SET").is_some() {
        return Ok(ExecResult::default());
    }
    Err(unsupported(sql))
}

fn run_insert(tables: &mut Tables, rest: &str) -> Result<ExecResult, QuerysetError> {
    let (table, rest) = parse_ident(rest)?;
    let rest = eat_ci(rest, "SET ").ok_or_else(|| unsupported(rest))?;
    let (insert_part, update_part) = match find_top_level_ci(rest, " ON DUPLICATE KEY UPDATE ") {
        Some(idx) => (
            &rest[..idx],
            Some(&rest[idx + " ON DUPLICATE KEY UPDATE ".len()..]),
        ),
        None => (rest, None),
    };
    let inserts = parse_assignments(insert_part)?;
    let updates = update_part.map(parse_assignments).transpose()?;

    let table = tables
        .get_mut(&table)
        .ok_or_else(|| QuerysetError::Execution(format!("table `{table}` doesn't exist")))?;

    let explicit_id = inserts
        .iter()
        .find(|(name, _)| name == "id")
        .and_then(|(_, value)| value.as_int().copied());

    match explicit_id {
        Some(id) if table.rows.contains_key(&id) => {
            let Some(updates) = updates else {
                return Err(QuerysetError::Execution(format!(
                    "Duplicate entry '{id}' for key 'PRIMARY'"
                )));
            };
            let row = table
                .rows
                .get_mut(&id)
                .expect("row vanished under the table lock");
            let mut changed = false;
            for (name, value) in updates {
                if row.get(&name) != Some(&value) {
                    row.insert(name, value);
                    changed = true;
                }
            }
            // MySQL reports 2 for an upsert that updated, 0 for a no-op.
            Ok(ExecResult {
                affected_rows: if changed { 2 } else { 0 },
                last_insert_id: None,
            })
        }
        Some(id) => {
            let mut row: BTreeMap<String, SqlValue> = inserts.into_iter().collect();
            row.insert("id".to_string(), SqlValue::Int(id));
            table.rows.insert(id, row);
            table.next_id = table.next_id.max(id + 1);
            Ok(ExecResult {
                affected_rows: 1,
                last_insert_id: None,
            })
        }
        None => {
            let id = table.next_id;
            table.next_id += 1;
            let mut row: BTreeMap<String, SqlValue> = inserts
                .into_iter()
                .filter(|(name, _)| name != "id")
                .collect();
            row.insert("id".to_string(), SqlValue::Int(id));
            table.rows.insert(id, row);
            Ok(ExecResult {
                affected_rows: 1,
                last_insert_id: Some(id.unsigned_abs()),
            })
        }
    }
}

fn run_update(tables: &mut Tables, rest: &str) -> Result<ExecResult, QuerysetError> {
    let (table, rest) = parse_ident(rest)?;
    let rest = eat_ci(rest, "SET ").ok_or_else(|| unsupported(rest))?;
    let where_idx = find_top_level_ci(rest, " WHERE ").ok_or_else(|| unsupported(rest))?;
    let assignments = parse_assignments(&rest[..where_idx])?;
    let id = parse_id_predicate(&rest[where_idx + " WHERE ".len()..], "")?;

    let table = tables
        .get_mut(&table)
        .ok_or_else(|| QuerysetError::Execution(format!("table `{table}` doesn't exist")))?;
    let Some(row) = table.rows.get_mut(&id) else {
        return Ok(ExecResult::default());
    };
    let mut changed = false;
    for (name, value) in assignments {
        if row.get(&name) != Some(&value) {
            row.insert(name, value);
            changed = true;
        }
    }
    // Rows-changed semantics: an identical UPDATE affects zero rows.
    Ok(ExecResult {
        affected_rows: u64::from(changed),
        last_insert_id: None,
    })
}

fn run_delete(tables: &mut Tables, rest: &str) -> Result<ExecResult, QuerysetError> {
    let (table, rest) = parse_ident(rest)?;
    let rest = eat_ci(rest, "WHERE ").ok_or_else(|| unsupported(rest))?;
    let id = parse_id_predicate(rest, "LIMIT 1")?;
    let table = tables
        .get_mut(&table)
        .ok_or_else(|| QuerysetError::Execution(format!("table `{table}` doesn't exist")))?;
    let removed = table.rows.remove(&id).is_some();
    Ok(ExecResult {
        affected_rows: u64::from(removed),
        last_insert_id: None,
    })
}

fn run_query(tables: &Tables, sql: &str) -> Result<ResultSet, QuerysetError> {
    let sql = sql.trim();
    let rest = eat_ci(sql, "SELECT ").ok_or_else(|| unsupported(sql))?;
    let from_idx = find_top_level_ci(rest, " FROM ").ok_or_else(|| unsupported(sql))?;
    let cols = rest[..from_idx].trim();
    let rest = &rest[from_idx + " FROM ".len()..];
    let (table_name, rest) = parse_ident(rest)?;
    let table = tables
        .get(&table_name)
        .ok_or_else(|| QuerysetError::Execution(format!("table `{table_name}` doesn't exist")))?;

    let where_id = if rest.trim().is_empty() {
        None
    } else {
        let pred = eat_ci(rest.trim_start(), "WHERE ").ok_or_else(|| unsupported(sql))?;
        Some(parse_id_predicate(pred, "")?)
    };

    if cols.eq_ignore_ascii_case("count(*)") {
        let count = match where_id {
            Some(id) => i64::from(table.rows.contains_key(&id)),
            None => i64::try_from(table.rows.len()).unwrap_or(i64::MAX),
        };
        let mut result = ResultSet::new(vec!["count(*)".to_string()]);
        result.push_row(vec![SqlValue::Int(count)]);
        return Ok(result);
    }

    let projections = split_top_level(cols, ',')
        .into_iter()
        .map(parse_projection)
        .collect::<Result<Vec<_>, _>>()?;
    let mut result = ResultSet::new(projections.iter().map(|p| p.1.clone()).collect());
    let selected: Vec<&BTreeMap<String, SqlValue>> = match where_id {
        Some(id) => table.rows.get(&id).into_iter().collect(),
        None => table.rows.values().collect(),
    };
    for row in selected {
        result.push_row(
            projections
                .iter()
                .map(|(source, _)| row.get(source).cloned().unwrap_or(SqlValue::Null))
                .collect(),
        );
    }
    Ok(result)
}

// ---- parsing ----

fn unsupported(sql: &str) -> QuerysetError {
    QuerysetError::Execution(format!("unsupported statement: {sql}"))
}

/// Case-insensitive keyword prefix match; returns the remainder with leading
/// whitespace trimmed.
fn eat_ci<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    if input.len() >= keyword.len()
        && input.is_char_boundary(keyword.len())
        && input[..keyword.len()].eq_ignore_ascii_case(keyword)
    {
        Some(input[keyword.len()..].trim_start())
    } else {
        None
    }
}

/// Parse a backtick-quoted identifier, returning the name and the remainder.
fn parse_ident(input: &str) -> Result<(String, &str), QuerysetError> {
    let input = input.trim_start();
    let rest = input
        .strip_prefix('`')
        .ok_or_else(|| unsupported(input))?;
    let end = rest.find('`').ok_or_else(|| unsupported(input))?;
    Ok((rest[..end].to_string(), rest[end + 1..].trim_start()))
}

/// Find `needle` (case-insensitively) outside of single-quoted literals.
fn find_top_level_ci(haystack: &str, needle: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let mut in_quote = false;
    let mut idx = 0;
    while idx < bytes.len() {
        let b = bytes[idx];
        if in_quote {
            if b == b'\\' {
                idx += 2;
                continue;
            }
            if b == b'\'' {
                in_quote = false;
            }
            idx += 1;
            continue;
        }
        if b == b'\'' {
            in_quote = true;
            idx += 1;
            continue;
        }
        if haystack.len() - idx >= needle.len()
            && haystack.is_char_boundary(idx)
            && haystack.is_char_boundary(idx + needle.len())
            && haystack[idx..idx + needle.len()].eq_ignore_ascii_case(needle)
        {
            return Some(idx);
        }
        idx += 1;
    }
    None
}

/// Split on `sep` outside of quotes and parentheses.
fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut parts = Vec::new();
    let mut in_quote = false;
    let mut depth = 0usize;
    let mut start = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        let b = bytes[idx];
        if in_quote {
            if b == b'\\' {
                idx += 2;
                continue;
            }
            if b == b'\'' {
                in_quote = false;
            }
        } else if b == b'\'' {
            in_quote = true;
        } else if b == b'(' {
            depth += 1;
        } else if b == b')' {
            depth = depth.saturating_sub(1);
        } else if b == sep as u8 && depth == 0 {
            parts.push(&input[start..idx]);
            start = idx + 1;
        }
        idx += 1;
    }
    parts.push(&input[start..]);
    parts
}

/// Parse `name=value` pairs separated by top-level commas. Each value must
/// be one complete literal; trailing bytes after a literal are an error.
fn parse_assignments(input: &str) -> Result<Vec<(String, SqlValue)>, QuerysetError> {
    split_top_level(input.trim(), ',')
        .into_iter()
        .map(|part| {
            let part = part.trim();
            let eq = find_top_level_ci(part, "=")
                .ok_or_else(|| QuerysetError::Execution(format!("malformed assignment: {part}")))?;
            let name = part[..eq].trim().trim_matches('`').to_string();
            let value = parse_literal(part[eq + 1..].trim())?;
            Ok((name, value))
        })
        .collect()
}

/// Parse `id = <int>` (column match case-insensitive), optionally followed
/// by a fixed trailer such as `LIMIT 1`. Anything else trailing is an error.
fn parse_id_predicate(input: &str, trailer: &str) -> Result<i64, QuerysetError> {
    let rest = eat_ci(input.trim(), "id").ok_or_else(|| unsupported(input))?;
    let rest = rest
        .trim_start()
        .strip_prefix('=')
        .ok_or_else(|| unsupported(input))?;
    let (value, rest) = parse_literal_prefix(rest.trim_start())?;
    let rest = rest.trim();
    let ok_trailer = if trailer.is_empty() {
        rest.is_empty()
    } else {
        rest.eq_ignore_ascii_case(trailer)
    };
    if !ok_trailer {
        return Err(unsupported(input));
    }
    value
        .as_int()
        .copied()
        .ok_or_else(|| QuerysetError::Execution(format!("non-integer id predicate: {input}")))
}

fn parse_literal(input: &str) -> Result<SqlValue, QuerysetError> {
    let (value, rest) = parse_literal_prefix(input)?;
    if rest.trim().is_empty() {
        Ok(value)
    } else {
        // A literal followed by more input means the statement was not the
        // single statement it claimed to be.
        Err(QuerysetError::Execution(format!(
            "unexpected input after literal: {rest}"
        )))
    }
}

fn parse_literal_prefix(input: &str) -> Result<(SqlValue, &str), QuerysetError> {
    let input = input.trim_start();
    if let Some(rest) = input.strip_prefix('\'') {
        return parse_quoted(rest);
    }
    if let Some(rest) = eat_literal_word(input, "NULL") {
        return Ok((SqlValue::Null, rest));
    }
    if let Some(rest) = eat_literal_word(input, "TRUE") {
        return Ok((SqlValue::Bool(true), rest));
    }
    if let Some(rest) = eat_literal_word(input, "FALSE") {
        return Ok((SqlValue::Bool(false), rest));
    }
    if let Some(hex) = input.strip_prefix("0x") {
        let end = hex
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(hex.len());
        let bytes = (0..end)
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..(i + 2).min(end)], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| QuerysetError::Execution(format!("bad hex literal: {input}")))?;
        return Ok((SqlValue::Blob(bytes), &hex[end..]));
    }
    let end = input
        .find(|c: char| !(c.is_ascii_digit() || c == '-' || c == '.' || c == 'e' || c == 'E'))
        .unwrap_or(input.len());
    let token = &input[..end];
    if token.is_empty() {
        return Err(QuerysetError::Execution(format!("bad literal: {input}")));
    }
    let value = if let Ok(i) = token.parse::<i64>() {
        SqlValue::Int(i)
    } else if let Ok(f) = token.parse::<f64>() {
        SqlValue::Float(f)
    } else {
        return Err(QuerysetError::Execution(format!("bad literal: {token}")));
    };
    Ok((value, &input[end..]))
}

fn eat_literal_word<'a>(input: &'a str, word: &str) -> Option<&'a str> {
    if input.len() >= word.len()
        && input.is_char_boundary(word.len())
        && input[..word.len()].eq_ignore_ascii_case(word)
    {
        let rest = &input[word.len()..];
        if rest
            .chars()
            .next()
            .is_none_or(|c| !c.is_ascii_alphanumeric())
        {
            return Some(rest);
        }
    }
    None
}

/// Decode a quoted string with backslash escapes; input starts just past
/// the opening quote.
fn parse_quoted(input: &str) -> Result<(SqlValue, &str), QuerysetError> {
    let mut out = String::new();
    let mut chars = input.char_indices();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    break;
                };
                out.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    '0' => '\0',
                    'Z' => '\x1a',
                    other => other,
                });
            }
            '\'' => return Ok((SqlValue::Text(out), &input[idx + 1..])),
            other => out.push(other),
        }
    }
    Err(QuerysetError::Execution(
        "unterminated string literal".to_string(),
    ))
}

/// One SELECT-list entry: `(source column, output column)`.
fn parse_projection(part: &str) -> Result<(String, String), QuerysetError> {
    let part = part.trim();
    if let Some(idx) = find_top_level_ci(part, " as `") {
        let alias_part = &part[idx + " as `".len()..];
        let end = alias_part
            .find('`')
            .ok_or_else(|| unsupported(part))?;
        let alias = alias_part[..end].to_string();
        let source =
            last_backtick_ident(&part[..idx]).unwrap_or_else(|| part[..idx].trim().to_string());
        return Ok((source, alias));
    }
    let source = last_backtick_ident(part).unwrap_or_else(|| part.to_string());
    Ok((source.clone(), source))
}

fn last_backtick_ident(expr: &str) -> Option<String> {
    let close = expr.rfind('`')?;
    let open = expr[..close].rfind('`')?;
    Some(expr[open + 1..close].to_string())
}
