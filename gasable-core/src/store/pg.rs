//! Postgres + pgvector implementation of [`Store`].
//!
//! Uses runtime-checked queries (`sqlx::query`/`query_as`, not the `query!`
//! macros) since the macros require a live database at compile time; this
//! mirrors how the teacher's `SqliteStore` builds SQL strings directly
//! rather than depending on a schema-aware macro layer.

use super::{ErrorEvent, Hit, Store};
use crate::error::{ErrorKind, GasableError, Result};
use crate::model::{Agent, Chunk, RunRecord, Secret, ToolSpec, Workflow};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;

/// Connection-level errors are retried once with exponential backoff (spec
/// §4.1); all other errors propagate immediately.
async fn with_retry<F, Fut, T>(f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match f().await {
        Ok(v) => Ok(v),
        Err(e) if is_connection_error(&e) => {
            tokio::time::sleep(Duration::from_millis(200)).await;
            f().await.map_err(GasableError::from)
        }
        Err(e) => Err(GasableError::from(e)),
    }
}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

pub struct PgStore {
    pool: PgPool,
    schema: String,
    table: String,
    embed_col: String,
}

impl PgStore {
    /// `schema` is applied as the connection's `search_path` (with `public`
    /// kept reachable after it) so every unqualified table name below
    /// resolves there, rather than schema-qualifying each query string.
    pub async fn connect(database_url: &str, schema: &str, table: &str, embed_col: &str) -> Result<Self> {
        let search_path = format!("SET search_path TO {schema}, public");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move {
                    sqlx::query(sqlx::AssertSqlSafe(search_path)).execute(conn).await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await
            .map_err(GasableError::from)?;
        Ok(Self {
            pool,
            schema: schema.to_string(),
            table: table.to_string(),
            embed_col: embed_col.to_string(),
        })
    }

    /// Applies migrations creating the schema from spec §6 if not present.
    /// Safe to call on every boot (`CREATE TABLE IF NOT EXISTS`).
    pub async fn migrate(&self, embed_dim: usize) -> Result<()> {
        let create_schema = format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema);
        sqlx::query(sqlx::AssertSqlSafe(create_schema.as_str()))
            .execute(&self.pool)
            .await
            .map_err(GasableError::from)?;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(GasableError::from)?;
        sqlx::query("CREATE EXTENSION IF NOT EXISTS pg_trgm")
            .execute(&self.pool)
            .await
            .map_err(GasableError::from)?;

        let create_index = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                node_id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                {embed_col} vector({dim}),
                tsv tsvector GENERATED ALWAYS AS (to_tsvector('simple', text)) STORED,
                agent_id TEXT NOT NULL DEFAULT 'default',
                namespace TEXT NOT NULL DEFAULT 'global',
                chunk_index INT NOT NULL DEFAULT 0,
                li_metadata JSONB
            )
            "#,
            table = self.table,
            embed_col = self.embed_col,
            dim = embed_dim
        );
        sqlx::query(sqlx::AssertSqlSafe(create_index.as_str()))
            .execute(&self.pool)
            .await
            .map_err(GasableError::from)?;

        for stmt in [
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_hnsw ON {table} USING hnsw ({col} vector_cosine_ops)",
                table = self.table,
                col = self.embed_col
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_tsv ON {table} USING gin (tsv)",
                table = self.table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_trgm ON {table} USING gin (text gin_trgm_ops)",
                table = self.table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_agent_ns ON {table} (agent_id, namespace)",
                table = self.table
            ),
        ] {
            sqlx::query(sqlx::AssertSqlSafe(stmt.as_str())).execute(&self.pool).await.map_err(GasableError::from)?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gasable_agents (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                namespace TEXT NOT NULL,
                system_prompt TEXT NOT NULL,
                tool_allowlist TEXT[] NOT NULL DEFAULT '{}',
                answer_model TEXT NOT NULL,
                rerank_model TEXT NOT NULL,
                top_k INT NOT NULL DEFAULT 6,
                assistant_id TEXT,
                api_key TEXT,
                rag_settings JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gasable_workflows (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                namespace TEXT NOT NULL,
                graph JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                name TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                spec JSONB NOT NULL,
                version INT NOT NULL DEFAULT 1,
                installed_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS secrets (
                scope TEXT NOT NULL,
                key_name TEXT NOT NULL,
                ciphertext BYTEA NOT NULL,
                nonce BYTEA NOT NULL,
                version INT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (scope, key_name, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_runs (
                run_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                namespace TEXT NOT NULL,
                selected_agent TEXT NOT NULL,
                user_message TEXT NOT NULL,
                tool_calls JSONB NOT NULL,
                result_summary TEXT NOT NULL,
                elapsed_ms BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recent_errors (
                id BIGSERIAL PRIMARY KEY,
                ts TIMESTAMPTZ NOT NULL DEFAULT now(),
                kind TEXT NOT NULL,
                message TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;

        Ok(())
    }

    fn row_to_hit(row: &sqlx::postgres::PgRow) -> Hit {
        Hit {
            node_id: row.get("node_id"),
            text: row.get("text"),
            score: row.get::<f64, _>("score"),
            metadata: row
                .try_get::<serde_json::Value, _>("li_metadata")
                .unwrap_or(serde_json::Value::Null),
            agent_id: row.get("agent_id"),
            namespace: row.get("namespace"),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        for c in chunks {
            let embedding = c.embedding.clone().map(Vector::from);
            let stmt = format!(
                r#"
                INSERT INTO {table} (node_id, text, {embed_col}, agent_id, namespace, chunk_index, li_metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (node_id) DO UPDATE SET
                    text = EXCLUDED.text,
                    {embed_col} = EXCLUDED.{embed_col},
                    agent_id = EXCLUDED.agent_id,
                    namespace = EXCLUDED.namespace,
                    chunk_index = EXCLUDED.chunk_index,
                    li_metadata = EXCLUDED.li_metadata
                "#,
                table = self.table,
                embed_col = self.embed_col
            );
            sqlx::query(sqlx::AssertSqlSafe(stmt.as_str()))
                .bind(&c.node_id)
                .bind(&c.text)
                .bind(embedding)
                .bind(&c.agent_id)
                .bind(&c.namespace)
                .bind(c.chunk_index)
                .bind(&c.metadata)
                .execute(&self.pool)
                .await
                .map_err(GasableError::from)?;
        }
        Ok(())
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = format!(
            "SELECT node_id, text, {embed_col}, agent_id, namespace, chunk_index, li_metadata FROM {table} WHERE node_id = ANY($1)",
            table = self.table,
            embed_col = self.embed_col
        );
        let rows = sqlx::query(sqlx::AssertSqlSafe(stmt.as_str()))
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(GasableError::from)?;
        Ok(rows
            .into_iter()
            .map(|row| Chunk {
                node_id: row.get("node_id"),
                text: row.get("text"),
                embedding: row
                    .try_get::<Option<Vector>, _>(self.embed_col.as_str())
                    .ok()
                    .flatten()
                    .map(|v| v.to_vec()),
                agent_id: row.get("agent_id"),
                namespace: row.get("namespace"),
                chunk_index: row.get("chunk_index"),
                metadata: row
                    .try_get("li_metadata")
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }

    async fn vector_topk(
        &self,
        vector: &[f32],
        k: usize,
        agent_id: &str,
        namespace: &str,
    ) -> Result<Vec<Hit>> {
        // Orders directly by the `<=>` operator (cosine distance) so the HNSW
        // index is usable, per spec §4.1 ("plain ORDER BY (1 - vec <=> x) is
        // disallowed").
        let stmt = format!(
            r#"
            SELECT node_id, text, agent_id, namespace, li_metadata,
                   1 - ({embed_col} <=> $1) AS score
            FROM {table}
            WHERE (agent_id = $2 OR agent_id = 'default') AND namespace = $3
                  AND {embed_col} IS NOT NULL
            ORDER BY {embed_col} <=> $1
            LIMIT $4
            "#,
            table = self.table,
            embed_col = self.embed_col
        );
        let vec = Vector::from(vector.to_vec());
        let rows = with_retry(|| {
            sqlx::query(sqlx::AssertSqlSafe(stmt.as_str()))
                .bind(&vec)
                .bind(agent_id)
                .bind(namespace)
                .bind(k as i64)
                .fetch_all(&self.pool)
        })
        .await?;
        Ok(rows.iter().map(Self::row_to_hit).collect())
    }

    async fn bm25_topk(
        &self,
        query: &str,
        k: usize,
        agent_id: &str,
        namespace: &str,
    ) -> Result<Vec<Hit>> {
        let stmt = format!(
            r#"
            SELECT node_id, text, agent_id, namespace, li_metadata,
                   ts_rank_cd(tsv, plainto_tsquery('simple', $1)) AS score
            FROM {table}
            WHERE (agent_id = $2 OR agent_id = 'default') AND namespace = $3
                  AND tsv @@ plainto_tsquery('simple', $1)
            ORDER BY score DESC
            LIMIT $4
            "#,
            table = self.table
        );
        let rows = with_retry(|| {
            sqlx::query(sqlx::AssertSqlSafe(stmt.as_str()))
                .bind(query)
                .bind(agent_id)
                .bind(namespace)
                .bind(k as i64)
                .fetch_all(&self.pool)
        })
        .await?;
        Ok(rows.iter().map(Self::row_to_hit).collect())
    }

    async fn ilike_topk(
        &self,
        tokens: &[String],
        k: usize,
        agent_id: &str,
        namespace: &str,
    ) -> Result<Vec<Hit>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let tokens: Vec<&String> = tokens.iter().take(6).collect();
        let mut clauses = Vec::new();
        let mut binds: Vec<String> = Vec::new();
        for (i, t) in tokens.iter().enumerate() {
            clauses.push(format!("text ILIKE ${}", i + 4));
            binds.push(format!("%{}%", t));
        }
        let stmt = format!(
            r#"
            SELECT node_id, text, agent_id, namespace, li_metadata, 1.0::float8 AS score
            FROM {table}
            WHERE (agent_id = $2 OR agent_id = 'default') AND namespace = $3 AND ({clauses})
            LIMIT $1
            "#,
            table = self.table,
            clauses = clauses.join(" OR ")
        );
        let mut q = sqlx::query(sqlx::AssertSqlSafe(stmt.as_str())).bind(k as i64).bind(agent_id).bind(namespace);
        for b in &binds {
            q = q.bind(b);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(GasableError::from)?;
        Ok(rows.iter().map(Self::row_to_hit).collect())
    }

    async fn trigram_topk(
        &self,
        query: &str,
        k: usize,
        agent_id: &str,
        namespace: &str,
    ) -> Result<Vec<Hit>> {
        let stmt = format!(
            r#"
            SELECT node_id, text, agent_id, namespace, li_metadata,
                   similarity(text, $1) AS score
            FROM {table}
            WHERE (agent_id = $2 OR agent_id = 'default') AND namespace = $3 AND text % $1
            ORDER BY score DESC
            LIMIT $4
            "#,
            table = self.table
        );
        let rows = with_retry(|| {
            sqlx::query(sqlx::AssertSqlSafe(stmt.as_str()))
                .bind(query)
                .bind(agent_id)
                .bind(namespace)
                .bind(k as i64)
                .fetch_all(&self.pool)
        })
        .await?;
        Ok(rows.iter().map(Self::row_to_hit).collect())
    }

    async fn list_agents(&self, namespace: &str) -> Result<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM gasable_agents WHERE namespace = $1")
            .bind(namespace)
            .fetch_all(&self.pool)
            .await
            .map_err(GasableError::from)?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn get_agent(&self, id: &str) -> Result<Agent> {
        let row = sqlx::query("SELECT * FROM gasable_agents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(GasableError::from)?
            .ok_or_else(|| GasableError::NotFound(format!("agent {id}")))?;
        row_to_agent(&row)
    }

    async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        let allowlist: Vec<String> = agent.tool_allowlist.iter().cloned().collect();
        let rag_settings =
            serde_json::to_value(&agent.rag_settings).map_err(|e| GasableError::Internal(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO gasable_agents
                (id, display_name, namespace, system_prompt, tool_allowlist, answer_model,
                 rerank_model, top_k, assistant_id, api_key, rag_settings, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11, now())
            ON CONFLICT (id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                namespace = EXCLUDED.namespace,
                system_prompt = EXCLUDED.system_prompt,
                tool_allowlist = EXCLUDED.tool_allowlist,
                answer_model = EXCLUDED.answer_model,
                rerank_model = EXCLUDED.rerank_model,
                top_k = EXCLUDED.top_k,
                assistant_id = EXCLUDED.assistant_id,
                api_key = EXCLUDED.api_key,
                rag_settings = EXCLUDED.rag_settings,
                updated_at = now()
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.display_name)
        .bind(&agent.namespace)
        .bind(&agent.system_prompt)
        .bind(&allowlist)
        .bind(&agent.answer_model)
        .bind(&agent.rerank_model)
        .bind(agent.top_k as i32)
        .bind(&agent.assistant_id)
        .bind(&agent.api_key)
        .bind(&rag_settings)
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let rows = sqlx::query("SELECT spec FROM nodes")
            .fetch_all(&self.pool)
            .await
            .map_err(GasableError::from)?;
        rows.iter()
            .map(|r| {
                serde_json::from_value(r.get::<serde_json::Value, _>("spec"))
                    .map_err(|e| GasableError::Internal(e.to_string()))
            })
            .collect()
    }

    async fn get_tool(&self, name: &str) -> Result<ToolSpec> {
        let row = sqlx::query("SELECT spec FROM nodes WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(GasableError::from)?
            .ok_or_else(|| GasableError::NotFound(format!("tool {name}")))?;
        serde_json::from_value(row.get::<serde_json::Value, _>("spec"))
            .map_err(|e| GasableError::Internal(e.to_string()))
    }

    async fn upsert_tool(&self, tool: &ToolSpec) -> Result<()> {
        let spec = serde_json::to_value(tool).map_err(|e| GasableError::Internal(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO nodes (name, title, category, spec)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE SET title = EXCLUDED.title, category = EXCLUDED.category, spec = EXCLUDED.spec
            "#,
        )
        .bind(&tool.name)
        .bind(&tool.name)
        .bind(&tool.category)
        .bind(&spec)
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;
        Ok(())
    }

    async fn list_workflows(&self, namespace: &str) -> Result<Vec<Workflow>> {
        let rows = sqlx::query("SELECT id, display_name, namespace, graph FROM gasable_workflows WHERE namespace = $1")
            .bind(namespace)
            .fetch_all(&self.pool)
            .await
            .map_err(GasableError::from)?;
        rows.iter()
            .map(|row| {
                Ok(Workflow {
                    id: row.get("id"),
                    display_name: row.get("display_name"),
                    namespace: row.get("namespace"),
                    graph: serde_json::from_value(row.get::<serde_json::Value, _>("graph"))
                        .map_err(|e| GasableError::Internal(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn get_workflow(&self, id: &str) -> Result<Workflow> {
        let row = sqlx::query("SELECT id, display_name, namespace, graph FROM gasable_workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(GasableError::from)?
            .ok_or_else(|| GasableError::NotFound(format!("workflow {id}")))?;
        Ok(Workflow {
            id: row.get("id"),
            display_name: row.get("display_name"),
            namespace: row.get("namespace"),
            graph: serde_json::from_value(row.get::<serde_json::Value, _>("graph"))
                .map_err(|e| GasableError::Internal(e.to_string()))?,
        })
    }

    async fn upsert_workflow(&self, workflow: &Workflow) -> Result<()> {
        let graph = serde_json::to_value(&workflow.graph).map_err(|e| GasableError::Internal(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO gasable_workflows (id, display_name, namespace, graph, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                namespace = EXCLUDED.namespace,
                graph = EXCLUDED.graph,
                updated_at = now()
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.display_name)
        .bind(&workflow.namespace)
        .bind(&graph)
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;
        Ok(())
    }

    async fn append_run(&self, run: &RunRecord) -> Result<()> {
        let tool_calls = serde_json::to_value(&run.tool_calls).map_err(|e| GasableError::Internal(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO agent_runs
                (run_id, user_id, namespace, selected_agent, user_message, tool_calls, result_summary, elapsed_ms, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            "#,
        )
        .bind(&run.run_id)
        .bind(&run.user_id)
        .bind(&run.namespace)
        .bind(&run.selected_agent)
        .bind(&run.user_message)
        .bind(&tool_calls)
        .bind(&run.result_summary)
        .bind(run.elapsed_ms as i64)
        .bind(run.created_at)
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;
        Ok(())
    }

    async fn record_error(&self, kind: ErrorKind, message: &str) -> Result<()> {
        let kind_str = serde_json::to_value(kind)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "Internal".to_string());
        sqlx::query("INSERT INTO recent_errors (kind, message) VALUES ($1, $2)")
            .bind(kind_str)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(GasableError::from)?;
        Ok(())
    }

    async fn recent_errors(&self, n: usize) -> Result<Vec<ErrorEvent>> {
        let rows = sqlx::query("SELECT ts, kind, message FROM recent_errors ORDER BY id DESC LIMIT $1")
            .bind(n as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(GasableError::from)?;
        Ok(rows
            .iter()
            .map(|r| ErrorEvent {
                ts: r.get("ts"),
                kind: serde_json::from_value(serde_json::Value::String(r.get("kind")))
                    .unwrap_or(ErrorKind::Internal),
                message: r.get("message"),
            })
            .collect())
    }

    async fn put_secret(&self, secret: &Secret) -> Result<()> {
        sqlx::query(
            "INSERT INTO secrets (scope, key_name, ciphertext, nonce, version) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&secret.scope)
        .bind(&secret.key_name)
        .bind(&secret.ciphertext)
        .bind(&secret.nonce)
        .bind(secret.version)
        .execute(&self.pool)
        .await
        .map_err(GasableError::from)?;
        Ok(())
    }

    async fn get_secret_latest(&self, scope: &str, key_name: &str) -> Result<Secret> {
        let row = sqlx::query(
            "SELECT scope, key_name, ciphertext, nonce, version, created_at FROM secrets \
             WHERE scope = $1 AND key_name = $2 ORDER BY version DESC LIMIT 1",
        )
        .bind(scope)
        .bind(key_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(GasableError::from)?
        .ok_or_else(|| GasableError::NotFound(format!("secret not found: {scope}/{key_name}")))?;
        Ok(row_to_secret(&row))
    }

    async fn get_secret_version(&self, scope: &str, key_name: &str, version: i32) -> Result<Secret> {
        let row = sqlx::query(
            "SELECT scope, key_name, ciphertext, nonce, version, created_at FROM secrets \
             WHERE scope = $1 AND key_name = $2 AND version = $3",
        )
        .bind(scope)
        .bind(key_name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(GasableError::from)?
        .ok_or_else(|| GasableError::NotFound(format!("secret version not found: {scope}/{key_name}@{version}")))?;
        Ok(row_to_secret(&row))
    }

    async fn list_secrets(&self, scope: &str) -> Result<Vec<Secret>> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (key_name) scope, key_name, ciphertext, nonce, version, created_at \
             FROM secrets WHERE scope = $1 ORDER BY key_name, version DESC",
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await
        .map_err(GasableError::from)?;
        Ok(rows.iter().map(row_to_secret).collect())
    }

    async fn prune_secret_versions(&self, scope: &str, key_name: &str, keep_from_version: i32) -> Result<()> {
        sqlx::query("DELETE FROM secrets WHERE scope = $1 AND key_name = $2 AND version < $3")
            .bind(scope)
            .bind(key_name)
            .bind(keep_from_version)
            .execute(&self.pool)
            .await
            .map_err(GasableError::from)?;
        Ok(())
    }
}

fn row_to_secret(row: &sqlx::postgres::PgRow) -> Secret {
    Secret {
        key_name: row.get("key_name"),
        scope: row.get("scope"),
        ciphertext: row.get("ciphertext"),
        nonce: row.get("nonce"),
        version: row.get("version"),
        created_at: row.get("created_at"),
    }
}

fn row_to_agent(row: &sqlx::postgres::PgRow) -> Result<Agent> {
    let allowlist: Vec<String> = row.get("tool_allowlist");
    let rag_settings: serde_json::Value = row.get("rag_settings");
    Ok(Agent {
        id: row.get("id"),
        display_name: row.get("display_name"),
        namespace: row.get("namespace"),
        system_prompt: row.get("system_prompt"),
        tool_allowlist: allowlist.into_iter().collect(),
        answer_model: row.get("answer_model"),
        rerank_model: row.get("rerank_model"),
        top_k: row.get::<i32, _>("top_k") as usize,
        assistant_id: row.get("assistant_id"),
        api_key: row.get("api_key"),
        rag_settings: serde_json::from_value(rag_settings).unwrap_or_default(),
    })
}
