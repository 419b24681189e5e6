use serde::Serialize;
use serde_json::{Map, Value};

use super::{Connector, Database, DatabaseError, DatabaseResult};

pub type Record = Map<String, Value>;

/// Small helpers over [`Database::execute`] that return rows as JSON objects.
pub struct SqlQuery;

impl SqlQuery {
    pub fn fetch_one<K: Connector>(
        db: &Database<K>,
        sql: &str,
        params: &[Value],
    ) -> DatabaseResult<Option<Record>> {
        Ok(db.execute(sql, params)?.records().into_iter().next())
    }

    pub fn fetch_all<K: Connector>(
        db: &Database<K>,
        sql: &str,
        params: &[Value],
    ) -> DatabaseResult<Vec<Record>> {
        Ok(db.execute(sql, params)?.records())
    }

    /// `true` if `table` has a row matching every `(column, value)` pair.
    /// No conditions never matches.
    pub fn exists<K: Connector>(
        db: &Database<K>,
        table: &str,
        conditions: &[(&str, Value)],
    ) -> DatabaseResult<bool> {
        if conditions.is_empty() {
            return Ok(false);
        }
        check_identifier(table)?;
        let mut clauses = Vec::with_capacity(conditions.len());
        for (index, (column, _)) in conditions.iter().enumerate() {
            check_identifier(column)?;
            clauses.push(format!("{column} = {}", db.backend().placeholder(index + 1)));
        }
        let params: Vec<Value> = conditions.iter().map(|(_, value)| value.clone()).collect();
        let sql = format!("SELECT 1 FROM {table} WHERE {} LIMIT 1", clauses.join(" AND "));
        Ok(!db.execute(&sql, &params)?.is_empty())
    }

    /// First column of the first row as an integer; `0` when there are no rows.
    pub fn count<K: Connector>(db: &Database<K>, sql: &str, params: &[Value]) -> DatabaseResult<u64> {
        let rows = db.execute(sql, params)?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(as_count)
            .unwrap_or(0))
    }
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn check_identifier(name: &str) -> DatabaseResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(DatabaseError::InvalidIdentifier(name.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub total: u64,
    pub pages: u64,
    pub page: u64,
    pub limit: u64,
    pub rows: Vec<Record>,
}

/// Page/limit arithmetic. Non-positive input falls back to page 1, limit 20.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    page: u64,
    limit: u64,
}

impl Pager {
    pub const DEFAULT_LIMIT: u64 = 20;

    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: u64::try_from(page).ok().filter(|p| *p > 0).unwrap_or(1),
            limit: u64::try_from(limit)
                .ok()
                .filter(|l| *l > 0)
                .unwrap_or(Self::DEFAULT_LIMIT),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Rows skipped before this page. Saturates instead of wrapping for
    /// page numbers far past any real table.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self, total: u64) -> bool {
        self.page < self.pages(total)
    }

    /// Counts the rows of `sql`, then loads the requested page of it.
    pub fn paginate<K: Connector>(
        &self,
        db: &Database<K>,
        sql: &str,
        params: &[Value],
    ) -> DatabaseResult<Page> {
        let sql = sql.trim().trim_end_matches(';');
        let total = SqlQuery::count(db, &format!("SELECT COUNT(1) FROM ({sql}) AS _pager"), params)?;
        let rows = if total == 0 || self.offset() >= total {
            Vec::new()
        } else {
            let paged = format!("{sql} LIMIT {} OFFSET {}", self.limit, self.offset());
            SqlQuery::fetch_all(db, &paged, params)?
        };
        Ok(Page {
            total,
            pages: self.pages(total),
            page: self.page,
            limit: self.limit,
            rows,
        })
    }
}
