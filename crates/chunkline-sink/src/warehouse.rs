//! Warehouse appends: one schema per contract, one table per event method

use std::path::Path;

use chunkline_core::{DayKey, Record, Value};
use duckdb::{Connection, params, params_from_iter};

use crate::encode::{check_arity, infer_column};
use crate::error::SinkError;
use crate::layout::TableId;
use crate::schema::Column;

/// Analytical table store, loaded one day at a time
pub trait Warehouse: Send {
    /// Load one day of `records` into `table`, creating it if needed.
    ///
    /// With `schema`, the table is created with the registered column types;
    /// otherwise with types inferred from this first chunk. Rows already held
    /// for `day` are replaced, so loading the same day twice leaves one copy.
    /// Returns rows written.
    fn append(
        &mut self,
        table: &TableId,
        day: DayKey,
        header: &[String],
        schema: Option<&[Column]>,
        records: &[Record],
    ) -> Result<usize, SinkError>;
}

/// DuckDB database file. One instance is opened per process and cloned per stream.
pub struct DuckDbWarehouse {
    conn: Connection,
}

impl DuckDbWarehouse {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let conn = Connection::open(path)
            .map_err(|e| SinkError::Warehouse(format!("open {}: {e}", path.display())))?;
        log::debug!("Opened warehouse {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, SinkError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Second connection to the same database, for another stream's thread
    pub fn try_clone(&self) -> Result<Self, SinkError> {
        Ok(Self {
            conn: self.conn.try_clone()?,
        })
    }

    pub fn row_count(&self, table: &TableId) -> Result<u64, SinkError> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT count(*) FROM {}", qualified(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

impl Warehouse for DuckDbWarehouse {
    fn append(
        &mut self,
        table: &TableId,
        day: DayKey,
        header: &[String],
        schema: Option<&[Column]>,
        records: &[Record],
    ) -> Result<usize, SinkError> {
        let columns: Vec<(String, &'static str)> = match schema {
            Some(schema) => schema
                .iter()
                .map(|c| (c.name.to_string(), c.ty.sql_type()))
                .collect(),
            None => header
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), infer_column(records, i).sql_type()))
                .collect(),
        };
        check_arity(records, columns.len())?;
        let Some((timestamp_column, _)) = columns.first() else {
            return Err(SinkError::Config(format!("{table}: no columns")));
        };

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {};\n{}",
            quote_ident(&table.dataset),
            create_table_sql(table, &columns)
        ))?;
        let start = day.start_timestamp();
        let replaced = tx.execute(
            &delete_day_sql(table, timestamp_column),
            params![start, start + 86_400],
        )?;
        if replaced > 0 {
            log::warn!("{table}: replacing {replaced} rows already loaded for {day}");
        }
        {
            let mut stmt = tx.prepare(&insert_sql(table, &columns))?;
            for record in records {
                stmt.execute(params_from_iter(record.fields().iter().map(to_sql)))?;
            }
        }
        tx.commit()?;

        log::debug!("{table}: appended {} rows", records.len());
        Ok(records.len())
    }
}

fn to_sql(value: &Value) -> duckdb::types::Value {
    match value {
        Value::Null => duckdb::types::Value::Null,
        Value::Int(i) => duckdb::types::Value::BigInt(*i),
        Value::Float(f) => duckdb::types::Value::Double(*f),
        Value::Text(s) => duckdb::types::Value::Text(s.clone()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(table: &TableId) -> String {
    format!("{}.{}", quote_ident(&table.dataset), quote_ident(&table.table))
}

fn create_table_sql(table: &TableId, columns: &[(String, &str)]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|(name, ty)| format!("{} {ty}", quote_ident(name)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified(table),
        cols.join(", ")
    )
}

/// Rows whose timestamp column falls in `[?, ?)`
fn delete_day_sql(table: &TableId, timestamp_column: &str) -> String {
    format!(
        "DELETE FROM {} WHERE TRY_CAST({col} AS BIGINT) >= ? AND TRY_CAST({col} AS BIGINT) < ?",
        qualified(table),
        col = quote_ident(timestamp_column)
    )
}

/// Positional insert; parameters are cast to the declared column types
fn insert_sql(table: &TableId, columns: &[(String, &str)]) -> String {
    let values: Vec<String> = columns
        .iter()
        .map(|(_, ty)| format!("CAST(? AS {ty})"))
        .collect();
    format!("INSERT INTO {} VALUES ({})", qualified(table), values.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SWAP;

    fn day_of(ts: i64) -> DayKey {
        DayKey::from_timestamp(ts).unwrap()
    }

    fn table() -> TableId {
        TableId {
            dataset: "torn".into(),
            table: "Swap".into(),
        }
    }

    #[test]
    fn create_table_quotes_identifiers() {
        let sql = create_table_sql(&table(), &[("blocknumber".into(), "BIGINT")]);
        assert_eq!(
            sql,
            r#"CREATE TABLE IF NOT EXISTS "torn"."Swap" ("blocknumber" BIGINT)"#
        );
    }

    #[test]
    fn insert_casts_each_parameter() {
        let sql = insert_sql(
            &table(),
            &[("a".into(), "BIGINT"), ("b".into(), "VARCHAR")],
        );
        assert_eq!(
            sql,
            r#"INSERT INTO "torn"."Swap" VALUES (CAST(? AS BIGINT), CAST(? AS VARCHAR))"#
        );
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident(r#"a"b"#), r#""a""b""#);
    }

    #[test]
    fn append_with_registered_schema() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let record = Record::new(vec![
            Value::Int(1_700_000_000),
            Value::Int(18_000_000),
            Value::Text("0xabc".into()),
            Value::Int(3),
            Value::Int(7),
            Value::Text("0xrecipient".into()),
            Value::Int(1),
            Value::Text("123456789012345678901234567890".into()),
            Value::Int(5_000_000_000),
            Value::Int(21_000),
        ]);
        let header: Vec<String> = SWAP.iter().map(|c| c.name.to_string()).collect();

        let n = wh
            .append(&table(), day_of(1_700_000_000), &header, Some(SWAP), &[record.clone(), record])
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(wh.row_count(&table()).unwrap(), 2);

        let torn: String = wh
            .conn
            .query_row(r#"SELECT CAST(torn AS VARCHAR) FROM "torn"."Swap" LIMIT 1"#, [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(torn, "123456789012345678901234567890");
    }

    #[test]
    fn uint256_amount_is_kept_exactly() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let record = Record::new(vec![
            Value::Int(1_700_000_000),
            Value::Int(18_000_000),
            Value::Text("0xabc".into()),
            Value::Int(3),
            Value::Int(7),
            Value::Text("0xrecipient".into()),
            Value::Int(1),
            Value::Text(max.into()),
            Value::Int(5_000_000_000),
            Value::Int(21_000),
        ]);
        let header: Vec<String> = SWAP.iter().map(|c| c.name.to_string()).collect();
        wh.append(&table(), day_of(1_700_000_000), &header, Some(SWAP), &[record])
            .unwrap();

        let torn: String = wh
            .conn
            .query_row(r#"SELECT torn FROM "torn"."Swap""#, [], |r| r.get(0))
            .unwrap();
        assert_eq!(torn, max);
    }

    #[test]
    fn append_infers_types_without_schema() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let t = TableId {
            dataset: "usdt".into(),
            table: "Transfer".into(),
        };
        let header = vec!["timestamp".to_string(), "txhash".to_string()];
        let records = vec![
            Record::new(vec![Value::Int(1), Value::Text("0x1".into())]),
            Record::new(vec![Value::Int(2), Value::Null]),
        ];
        wh.append(&t, day_of(0), &header, None, &records).unwrap();
        assert_eq!(wh.row_count(&t).unwrap(), 2);
    }

    #[test]
    fn reloading_a_day_replaces_its_rows() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let t = TableId {
            dataset: "usdt".into(),
            table: "Transfer".into(),
        };
        let header = vec!["timestamp".to_string(), "blocknumber".to_string()];
        let day5 = vec![
            Record::new(vec![Value::Int(1_704_412_800), Value::Int(1)]),
            Record::new(vec![Value::Int(1_704_412_860), Value::Int(2)]),
        ];
        let day6 = vec![Record::new(vec![Value::Int(1_704_499_200), Value::Int(3)])];

        wh.append(&t, day_of(1_704_412_800), &header, None, &day5).unwrap();
        wh.append(&t, day_of(1_704_499_200), &header, None, &day6).unwrap();
        wh.append(&t, day_of(1_704_412_800), &header, None, &day5).unwrap();
        assert_eq!(wh.row_count(&t).unwrap(), 3);

        let blocks: i64 = wh
            .conn
            .query_row(r#"SELECT sum(blocknumber) FROM "usdt"."Transfer""#, [], |r| r.get(0))
            .unwrap();
        assert_eq!(blocks, 6);
    }

    #[test]
    fn delete_day_quotes_timestamp_column() {
        assert_eq!(
            delete_day_sql(&table(), "timestamp"),
            r#"DELETE FROM "torn"."Swap" WHERE TRY_CAST("timestamp" AS BIGINT) >= ? AND TRY_CAST("timestamp" AS BIGINT) < ?"#
        );
    }

    #[test]
    fn arity_mismatch_rejected_before_writing() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let header: Vec<String> = SWAP.iter().map(|c| c.name.to_string()).collect();
        let short = Record::new(vec![Value::Int(1)]);
        let err = wh
            .append(&table(), day_of(1), &header, Some(SWAP), &[short])
            .unwrap_err();
        assert!(matches!(err, SinkError::Header { .. }));
    }

    #[test]
    fn type_mismatch_surfaces_as_warehouse_error() {
        let mut wh = DuckDbWarehouse::open_in_memory().unwrap();
        let t = TableId {
            dataset: "x".into(),
            table: "Y".into(),
        };
        let header = vec!["n".to_string()];
        wh.append(&t, day_of(1), &header, None, &[Record::new(vec![Value::Int(1)])])
            .unwrap();
        let err = wh
            .append(
                &t,
                day_of(1),
                &header,
                None,
                &[Record::new(vec![Value::Text("abc".into())])],
            )
            .unwrap_err();
        assert!(matches!(err, SinkError::Warehouse(_)));
        assert_eq!(wh.row_count(&t).unwrap(), 1);
    }
}
