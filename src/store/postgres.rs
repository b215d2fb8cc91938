//! PostgreSQL store: descriptor-driven SQL over a sqlx pool.
//!
//! Statements are built from the entity descriptor with quoted identifiers
//! and `$n` placeholders. Every parameter is bound as text and cast in SQL
//! to the column's declared type, so one bind path covers all field types.
//! A scope is one pooled connection, returned to the pool on drop.

use super::{Key, Record, Store, StoreError, StoreScope};
use crate::descriptor::{EntityDescriptor, FieldType};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresStore { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(PostgresStore::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `CREATE TABLE IF NOT EXISTS` per descriptor. Bootstrap only; schema
    /// evolution of existing tables is out of scope.
    pub async fn ensure_entity_tables(
        &self,
        entities: &[&EntityDescriptor],
    ) -> Result<(), StoreError> {
        for entity in entities {
            let ddl = create_table_ddl(entity);
            tracing::debug!(entity = %entity.name, sql = %ddl, "ensure table");
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn scope(&self) -> Result<Box<dyn StoreScope>, StoreError> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Box::new(PgScope { conn }))
    }
}

struct PgScope {
    conn: sqlx::pool::PoolConnection<sqlx::Postgres>,
}

#[async_trait]
impl StoreScope for PgScope {
    async fn insert(
        &mut self,
        entity: &EntityDescriptor,
        record: Record,
    ) -> Result<Record, StoreError> {
        let (sql, params) = insert_query(entity, &record);
        tracing::debug!(sql = %sql, "insert");
        let row = bind_all(sqlx::query(&sql), params)
            .fetch_one(&mut *self.conn)
            .await
            .map_err(store_error)?;
        Ok(row_to_record(&row))
    }

    async fn get(
        &mut self,
        entity: &EntityDescriptor,
        key: Key,
    ) -> Result<Option<Record>, StoreError> {
        let sql = select_by_key_query(entity);
        tracing::debug!(sql = %sql, key, "get");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(store_error)?;
        Ok(row.map(|r| row_to_record(&r)))
    }

    async fn list(&mut self, entity: &EntityDescriptor) -> Result<Vec<Record>, StoreError> {
        let sql = list_query(entity);
        tracing::debug!(sql = %sql, "list");
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(store_error)?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn update(
        &mut self,
        entity: &EntityDescriptor,
        record: Record,
    ) -> Result<Record, StoreError> {
        let key = record
            .get(&entity.primary_key_field)
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::Backend("update without primary key".into()))?;
        let (sql, params) = update_query(entity, &record);
        tracing::debug!(sql = %sql, key, "update");
        let row = bind_all(sqlx::query(&sql), params)
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(store_error)?;
        row.map(|r| row_to_record(&r)).ok_or(StoreError::NotFound)
    }

    async fn delete(&mut self, entity: &EntityDescriptor, key: Key) -> Result<(), StoreError> {
        let sql = delete_query(entity);
        tracing::debug!(sql = %sql, key, "delete");
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(store_error)?;
        row.map(|_| ()).ok_or(StoreError::NotFound)
    }
}

fn store_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Backend(e.to_string())
}

type PgQuery<'q> =
    sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn bind_all(mut query: PgQuery<'_>, params: Vec<Option<String>>) -> PgQuery<'_> {
    for p in params {
        query = query.bind(p);
    }
    query
}

/// Quote identifier for PostgreSQL (names come from descriptors, not requests).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn sql_type(t: FieldType) -> &'static str {
    match t {
        FieldType::Integer => "bigint",
        FieldType::Float => "double precision",
        FieldType::Text => "text",
        FieldType::Boolean => "boolean",
        FieldType::Timestamp => "timestamptz",
        FieldType::Json => "jsonb",
    }
}

/// Placeholder with a cast from the text bind to the column type.
fn placeholder(n: usize, t: FieldType) -> String {
    format!("${}::{}", n, sql_type(t))
}

/// Text rendering of a JSON value for binding; `None` becomes SQL NULL.
fn text_param(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(v.to_string()),
    }
}

fn select_list(entity: &EntityDescriptor) -> String {
    let mut cols = vec![quoted(&entity.primary_key_field)];
    cols.extend(entity.fields.iter().map(|f| quoted(&f.name)));
    cols.join(", ")
}

fn insert_query(entity: &EntityDescriptor, record: &Record) -> (String, Vec<Option<String>>) {
    let mut columns = Vec::with_capacity(entity.fields.len());
    let mut placeholders = Vec::with_capacity(entity.fields.len());
    let mut params = Vec::with_capacity(entity.fields.len());
    for (n, field) in entity.fields.iter().enumerate() {
        columns.push(quoted(&field.name));
        placeholders.push(placeholder(n + 1, field.type_tag));
        params.push(record.get(&field.name).and_then(text_param));
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(&entity.name),
        columns.join(", "),
        placeholders.join(", "),
        select_list(entity),
    );
    (sql, params)
}

fn select_by_key_query(entity: &EntityDescriptor) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1",
        select_list(entity),
        quoted(&entity.name),
        quoted(&entity.primary_key_field),
    )
}

fn list_query(entity: &EntityDescriptor) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY {}",
        select_list(entity),
        quoted(&entity.name),
        quoted(&entity.primary_key_field),
    )
}

fn update_query(entity: &EntityDescriptor, record: &Record) -> (String, Vec<Option<String>>) {
    let mut assignments = Vec::with_capacity(entity.fields.len());
    let mut params = Vec::with_capacity(entity.fields.len());
    for (n, field) in entity.fields.iter().enumerate() {
        assignments.push(format!(
            "{} = {}",
            quoted(&field.name),
            placeholder(n + 1, field.type_tag)
        ));
        params.push(record.get(&field.name).and_then(text_param));
    }
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
        quoted(&entity.name),
        assignments.join(", "),
        quoted(&entity.primary_key_field),
        entity.fields.len() + 1,
        select_list(entity),
    );
    (sql, params)
}

fn delete_query(entity: &EntityDescriptor) -> String {
    format!(
        "DELETE FROM {} WHERE {} = $1 RETURNING {}",
        quoted(&entity.name),
        quoted(&entity.primary_key_field),
        quoted(&entity.primary_key_field),
    )
}

fn create_table_ddl(entity: &EntityDescriptor) -> String {
    let mut columns = vec![format!(
        "{} BIGSERIAL PRIMARY KEY",
        quoted(&entity.primary_key_field)
    )];
    for field in &entity.fields {
        let mut col = format!("{} {}", quoted(&field.name), sql_type(field.type_tag));
        if field.unique {
            col.push_str(" UNIQUE");
        }
        columns.push(col);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quoted(&entity.name),
        columns.join(", ")
    )
}

fn row_to_record(row: &PgRow) -> Record {
    use sqlx::Column;
    let mut record = Record::new();
    for col in row.columns() {
        let name = col.name();
        record.insert(name.to_string(), cell_to_value(row, name));
    }
    record
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
