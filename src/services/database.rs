use crate::config::Config;
use crate::error::{AppError, Result};
use serde::{de::DeserializeOwned, Serialize};
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use surrealdb::{Response, Surreal};
use tracing::{debug, error, info};

/// 表结构与唯一约束
///
/// `follow_pair` 与 `notification_action` 两个唯一索引承担关注去重和通知幂等，
/// 不要改成“先查再写”。
const SCHEMA: &str = r#"
    DEFINE TABLE user_profile SCHEMALESS;
    DEFINE INDEX user_username ON TABLE user_profile FIELDS username UNIQUE;

    DEFINE TABLE follow SCHEMALESS;
    DEFINE INDEX follow_pair ON TABLE follow FIELDS follower_id, following_id UNIQUE;
    DEFINE INDEX follow_following ON TABLE follow FIELDS following_id;

    DEFINE TABLE post SCHEMALESS;
    DEFINE INDEX post_author ON TABLE post FIELDS user_id;

    DEFINE TABLE notification SCHEMALESS;
    DEFINE INDEX notification_action ON TABLE notification FIELDS action_key UNIQUE;
    DEFINE INDEX notification_recipient ON TABLE notification FIELDS recipient_id;
"#;

/// 数据库服务
#[derive(Clone)]
pub struct Database {
    client: Surreal<Any>,
    pub config: Config,
}

impl Database {
    /// 创建新的数据库实例并初始化表结构
    pub async fn new(config: &Config) -> Result<Self> {
        info!("Initializing database connection to {}", config.database_url);

        let client = any::connect(config.database_url.as_str()).await?;

        if !config.is_embedded_database() {
            client
                .signin(Root {
                    username: &config.database_username,
                    password: &config.database_password,
                })
                .await?;
        }

        client
            .use_ns(config.database_namespace.as_str())
            .use_db(config.database_name.as_str())
            .await?;

        let db = Self {
            client,
            config: config.clone(),
        };
        db.define_schema().await?;

        Ok(db)
    }

    async fn define_schema(&self) -> Result<()> {
        self.client.query(SCHEMA).await?.check()?;
        debug!("Database schema defined");
        Ok(())
    }

    /// 验证数据库连接
    pub async fn verify_connection(&self) -> Result<()> {
        match self.client.query("INFO FOR DB").await.and_then(|r| r.check()) {
            Ok(_) => {
                info!("Database connection verified successfully");
                Ok(())
            }
            Err(e) => {
                error!("Failed to verify database connection: {}", e);
                Err(AppError::from(e))
            }
        }
    }

    /// 执行原始查询
    pub async fn query(&self, sql: &str) -> Result<Response> {
        debug!("Executing query: {}", sql);
        Ok(self.client.query(sql).await?)
    }

    /// 执行带参数的查询
    pub async fn query_with_params<P>(&self, sql: &str, params: P) -> Result<Response>
    where
        P: Serialize,
    {
        debug!("Executing query: {}", sql);
        Ok(self.client.query(sql).bind(params).await?)
    }

    /// 执行查询并取第一条语句的全部结果
    pub async fn fetch_all<T, P>(&self, sql: &str, params: P) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let mut response = self.query_with_params(sql, params).await?;
        let rows: Vec<T> = response.take(0)?;
        Ok(rows)
    }

    /// 执行查询并取第一条结果
    pub async fn fetch_one<T, P>(&self, sql: &str, params: P) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    /// 创建记录，`data` 中的 `id` 字段作为记录 ID
    ///
    /// 违反唯一索引时返回原始 `surrealdb::Error`，由调用方决定如何映射。
    pub async fn create<T>(&self, table: &str, data: &T) -> std::result::Result<(), surrealdb::Error>
    where
        T: Serialize,
    {
        let sql = format!("CREATE {} CONTENT $data RETURN NONE", table);
        self.client
            .query(sql)
            .bind(("data", data))
            .await?
            .check()?;
        Ok(())
    }

    /// `SELECT count() ... GROUP ALL` 的便捷封装
    pub async fn count<P>(&self, sql: &str, params: P) -> Result<i64>
    where
        P: Serialize,
    {
        let rows: Vec<serde_json::Value> = self.fetch_all(sql, params).await?;
        Ok(rows
            .first()
            .and_then(|v| v.get("count"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }
}

/// 唯一索引冲突（或记录已存在）
pub fn is_unique_violation(err: &surrealdb::Error) -> bool {
    let message = err.to_string();
    message.contains("already contains") || message.contains("already exists")
}
