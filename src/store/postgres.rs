//! Postgres definition backend
//!
//! Tree-shaped definitions persist as parent-pointer rows: one
//! `api_definition` row plus `api_parameter`/`api_filter` rows linked by
//! `parent_id`, with `position` preserving sibling order.
//!
//! `persist` is full replace-by-slug inside a single transaction: upsert the
//! parent row, delete all prior child rows, insert the new trees depth-first
//! (parents before children). A crash mid-save rolls back to the previous
//! definition; there is never a half-replaced tree.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::DefinitionBackend;
use crate::definition::{ApiDocument, DisplayFieldDoc, FilterNode, ParamNode, SetFieldDoc};
use crate::error::StorageError;

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS api_definition (
    id UUID PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    app TEXT NOT NULL,
    model TEXT NOT NULL,
    operation TEXT NOT NULL,
    summary TEXT,
    ordering JSONB NOT NULL DEFAULT '[]',
    expand_fields JSONB NOT NULL DEFAULT '[]',
    func_name TEXT,
    demo JSONB,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS api_parameter (
    id UUID PRIMARY KEY,
    api_id UUID NOT NULL REFERENCES api_definition(id) ON DELETE CASCADE,
    parent_id UUID REFERENCES api_parameter(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    param_type TEXT NOT NULL,
    required BOOLEAN NOT NULL DEFAULT FALSE,
    is_array BOOLEAN NOT NULL DEFAULT FALSE,
    default_value JSONB,
    description TEXT,
    layer INT NOT NULL,
    position INT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_filter (
    id UUID PRIMARY KEY,
    api_id UUID NOT NULL REFERENCES api_definition(id) ON DELETE CASCADE,
    parent_id UUID REFERENCES api_filter(id) ON DELETE CASCADE,
    is_container BOOLEAN NOT NULL,
    operator TEXT,
    field TEXT,
    value JSONB,
    expression TEXT,
    position INT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_display_field (
    id UUID PRIMARY KEY,
    api_id UUID NOT NULL REFERENCES api_definition(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    position INT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_set_field (
    id UUID PRIMARY KEY,
    api_id UUID NOT NULL REFERENCES api_definition(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    position INT NOT NULL
);
"#;

pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the definition tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA_DDL).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DefinitionBackend for PgBackend {
    async fn fetch(&self, slug: &str) -> Result<Option<ApiDocument>, StorageError> {
        let Some(row) = sqlx::query(
            r#"SELECT id, slug, app, model, operation, summary, ordering,
                      expand_fields, func_name, demo
               FROM api_definition WHERE slug = $1"#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let api_id: Uuid = row.get("id");
        let mut doc = ApiDocument {
            slug: row.get("slug"),
            app: row.get("app"),
            model: row.get("model"),
            operation: row.get("operation"),
            summary: row.get("summary"),
            ordering: serde_json::from_value(row.get("ordering"))?,
            expand_fields: serde_json::from_value(row.get("expand_fields"))?,
            func_name: row.get("func_name"),
            demo: row.get("demo"),
            parameter: Vec::new(),
            display_field: Vec::new(),
            set_field: Vec::new(),
            filter: Vec::new(),
        };

        doc.parameter = self.fetch_parameters(api_id).await?;
        doc.filter = self.fetch_filters(api_id).await?;

        let display_rows = sqlx::query(
            "SELECT name FROM api_display_field WHERE api_id = $1 ORDER BY position",
        )
        .bind(api_id)
        .fetch_all(&self.pool)
        .await?;
        doc.display_field = display_rows
            .into_iter()
            .map(|r| DisplayFieldDoc::Name(r.get("name")))
            .collect();

        let set_rows = sqlx::query(
            "SELECT name, value FROM api_set_field WHERE api_id = $1 ORDER BY position",
        )
        .bind(api_id)
        .fetch_all(&self.pool)
        .await?;
        doc.set_field = set_rows
            .into_iter()
            .map(|r| SetFieldDoc::Pair(r.get("name"), r.get("value")))
            .collect();

        Ok(Some(doc))
    }

    async fn persist(&self, doc: &ApiDocument) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let api_id: Uuid = sqlx::query_scalar(
            r#"INSERT INTO api_definition
                   (id, slug, app, model, operation, summary, ordering,
                    expand_fields, func_name, demo, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
               ON CONFLICT (slug) DO UPDATE SET
                   app = EXCLUDED.app,
                   model = EXCLUDED.model,
                   operation = EXCLUDED.operation,
                   summary = EXCLUDED.summary,
                   ordering = EXCLUDED.ordering,
                   expand_fields = EXCLUDED.expand_fields,
                   func_name = EXCLUDED.func_name,
                   demo = EXCLUDED.demo,
                   updated_at = NOW()
               RETURNING id"#,
        )
        .bind(Uuid::new_v4())
        .bind(&doc.slug)
        .bind(&doc.app)
        .bind(&doc.model)
        .bind(&doc.operation)
        .bind(&doc.summary)
        .bind(serde_json::to_value(&doc.ordering)?)
        .bind(serde_json::to_value(&doc.expand_fields)?)
        .bind(&doc.func_name)
        .bind(&doc.demo)
        .fetch_one(&mut *tx)
        .await?;

        // Children are never updated in place: delete and rebuild
        sqlx::query("DELETE FROM api_parameter WHERE api_id = $1")
            .bind(api_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM api_filter WHERE api_id = $1")
            .bind(api_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM api_display_field WHERE api_id = $1")
            .bind(api_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM api_set_field WHERE api_id = $1")
            .bind(api_id)
            .execute(&mut *tx)
            .await?;

        insert_parameters(&mut tx, api_id, &doc.parameter).await?;
        insert_filters(&mut tx, api_id, &doc.filter).await?;

        for (position, field) in doc.display_field.iter().enumerate() {
            sqlx::query(
                "INSERT INTO api_display_field (id, api_id, name, position)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(api_id)
            .bind(field.name())
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }
        for (position, field) in doc.set_field.iter().enumerate() {
            sqlx::query(
                "INSERT INTO api_set_field (id, api_id, name, value, position)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(api_id)
            .bind(field.name())
            .bind(field.value_template())
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, slug: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM api_definition WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn slugs(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT slug FROM api_definition ORDER BY slug")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("slug")).collect())
    }
}

impl PgBackend {
    async fn fetch_parameters(&self, api_id: Uuid) -> Result<Vec<ParamNode>, StorageError> {
        let rows = sqlx::query(
            r#"SELECT id, parent_id, name, param_type, required, is_array,
                      default_value, description
               FROM api_parameter WHERE api_id = $1
               ORDER BY layer, position"#,
        )
        .bind(api_id)
        .fetch_all(&self.pool)
        .await?;

        let rows: Vec<(Uuid, Option<Uuid>, ParamNode)> = rows
            .into_iter()
            .map(|r| {
                (
                    r.get::<Uuid, _>("id"),
                    r.get::<Option<Uuid>, _>("parent_id"),
                    ParamNode {
                        name: r.get("name"),
                        desc: r.get("description"),
                        type_name: r.get("param_type"),
                        required: r.get("required"),
                        is_array: r.get("is_array"),
                        default: r.get("default_value"),
                        children: Vec::new(),
                    },
                )
            })
            .collect();

        // Rows are sorted (layer, position), so siblings come out in order
        fn build(rows: &[(Uuid, Option<Uuid>, ParamNode)], parent: Option<Uuid>) -> Vec<ParamNode> {
            rows.iter()
                .filter(|(_, pid, _)| *pid == parent)
                .map(|(id, _, node)| {
                    let mut node = node.clone();
                    node.children = build(rows, Some(*id));
                    node
                })
                .collect()
        }

        Ok(build(&rows, None))
    }

    async fn fetch_filters(&self, api_id: Uuid) -> Result<Vec<FilterNode>, StorageError> {
        let rows = sqlx::query(
            r#"SELECT id, parent_id, is_container, operator, field, value, expression
               FROM api_filter WHERE api_id = $1
               ORDER BY position"#,
        )
        .bind(api_id)
        .fetch_all(&self.pool)
        .await?;

        struct FilterRow {
            id: Uuid,
            parent_id: Option<Uuid>,
            is_container: bool,
            operator: Option<String>,
            field: Option<String>,
            value: Option<serde_json::Value>,
            expression: Option<String>,
        }

        let rows: Vec<FilterRow> = rows
            .into_iter()
            .map(|r| FilterRow {
                id: r.get("id"),
                parent_id: r.get("parent_id"),
                is_container: r.get("is_container"),
                operator: r.get("operator"),
                field: r.get("field"),
                value: r.get("value"),
                expression: r.get("expression"),
            })
            .collect();

        fn build(rows: &[FilterRow], parent: Option<Uuid>) -> Vec<FilterNode> {
            rows.iter()
                .filter(|r| r.parent_id == parent)
                .map(|r| {
                    if r.is_container {
                        FilterNode::Container {
                            operator: r.operator.clone(),
                            children: build(rows, Some(r.id)),
                        }
                    } else {
                        FilterNode::Leaf {
                            field: r.field.clone(),
                            operator: r.operator.clone(),
                            value: r.value.clone(),
                            expression: r.expression.clone(),
                        }
                    }
                })
                .collect()
        }

        Ok(build(&rows, None))
    }
}

/// Insert the parameter tree depth-first, parents before children
async fn insert_parameters(
    tx: &mut Transaction<'_, Postgres>,
    api_id: Uuid,
    roots: &[ParamNode],
) -> Result<(), StorageError> {
    // Explicit stack instead of async recursion; reversed pushes keep
    // sibling order stable
    let mut stack: Vec<(&ParamNode, Option<Uuid>, i32, i32)> = roots
        .iter()
        .enumerate()
        .rev()
        .map(|(i, n)| (n, None, 0, i as i32))
        .collect();

    while let Some((node, parent_id, layer, position)) = stack.pop() {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO api_parameter
                   (id, api_id, parent_id, name, param_type, required,
                    is_array, default_value, description, layer, position)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(id)
        .bind(api_id)
        .bind(parent_id)
        .bind(&node.name)
        .bind(&node.type_name)
        .bind(node.required)
        .bind(node.is_array)
        .bind(&node.default)
        .bind(&node.desc)
        .bind(layer)
        .bind(position)
        .execute(&mut **tx)
        .await?;

        for (i, child) in node.children.iter().enumerate().rev() {
            stack.push((child, Some(id), layer + 1, i as i32));
        }
    }
    Ok(())
}

/// Insert the filter tree depth-first, parents before children
async fn insert_filters(
    tx: &mut Transaction<'_, Postgres>,
    api_id: Uuid,
    roots: &[FilterNode],
) -> Result<(), StorageError> {
    let mut stack: Vec<(&FilterNode, Option<Uuid>, i32)> = roots
        .iter()
        .enumerate()
        .rev()
        .map(|(i, n)| (n, None, i as i32))
        .collect();

    while let Some((node, parent_id, position)) = stack.pop() {
        let id = Uuid::new_v4();
        match node {
            FilterNode::Container { operator, children } => {
                sqlx::query(
                    r#"INSERT INTO api_filter
                           (id, api_id, parent_id, is_container, operator, position)
                       VALUES ($1, $2, $3, TRUE, $4, $5)"#,
                )
                .bind(id)
                .bind(api_id)
                .bind(parent_id)
                .bind(operator)
                .bind(position)
                .execute(&mut **tx)
                .await?;
                for (i, child) in children.iter().enumerate().rev() {
                    stack.push((child, Some(id), i as i32));
                }
            }
            FilterNode::Leaf {
                field,
                operator,
                value,
                expression,
            } => {
                sqlx::query(
                    r#"INSERT INTO api_filter
                           (id, api_id, parent_id, is_container, operator,
                            field, value, expression, position)
                       VALUES ($1, $2, $3, FALSE, $4, $5, $6, $7, $8)"#,
                )
                .bind(id)
                .bind(api_id)
                .bind(parent_id)
                .bind(operator)
                .bind(field)
                .bind(value)
                .bind(expression)
                .bind(position)
                .execute(&mut **tx)
                .await?;
            }
        }
    }
    Ok(())
}
