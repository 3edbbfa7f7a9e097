// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use nftsync_common::config::PostgresConfig;
use sqlx::{
    ConnectOptions, PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};

#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct PostgresConnectOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl PostgresConnectOptions {
    /// Creates a new [`PostgresConnectOptions`] instance.
    #[must_use]
    pub const fn new(
        host: String,
        port: u16,
        username: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            host,
            port,
            username,
            password,
            database,
        }
    }

    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{username}:{password}@{host}:{port}/{database}",
            username = self.username,
            password = self.password,
            host = self.host,
            port = self.port,
            database = self.database
        )
    }

    /// Returns the administrator login used to create and drop the pipeline role.
    #[must_use]
    pub fn default_administrator() -> Self {
        Self::new(
            String::from("localhost"),
            5432,
            String::from("postgres"),
            String::from("pass"),
            String::from("nftsync"),
        )
    }
}

impl Default for PostgresConnectOptions {
    fn default() -> Self {
        Self::from(&PostgresConfig::default())
    }
}

impl From<&PostgresConfig> for PostgresConnectOptions {
    fn from(config: &PostgresConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.port,
            config.username.clone(),
            config.password.clone(),
            config.database.clone(),
        )
    }
}

impl From<PostgresConnectOptions> for PgConnectOptions {
    fn from(opt: PostgresConnectOptions) -> Self {
        Self::new()
            .host(opt.host.as_str())
            .port(opt.port)
            .username(opt.username.as_str())
            .password(opt.password.as_str())
            .database(opt.database.as_str())
            .disable_statement_logging()
    }
}

/// Opens a connection pool.
///
/// # Errors
///
/// Returns an error if the first connection cannot be established.
pub async fn connect_pg(options: PgConnectOptions, max_connections: u32) -> anyhow::Result<PgPool> {
    Ok(PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?)
}

/// Resolves the schema directory from `SCHEMA_DIR`, else the nearest `schema/sql` above the
/// current directory.
fn get_schema_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("SCHEMA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let current_dir = std::env::current_dir()?;
    current_dir
        .ancestors()
        .map(|dir| dir.join("schema").join("sql"))
        .find(|candidate| candidate.is_dir())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Could not find schema/sql above {} and SCHEMA_DIR is not set",
                current_dir.display()
            )
        })
}

fn schema_files(schema_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = std::fs::read_dir(schema_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, std::io::Error>>()?;
    files.retain(|path| path.extension().is_some_and(|ext| ext == "sql"));
    files.sort();
    Ok(files)
}

fn split_statements(sql: &str) -> impl Iterator<Item = String> + '_ {
    sql.split(';')
        .filter(|s| {
            s.lines()
                .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
        })
        .map(|s| format!("{s};"))
}

/// Creates the pipeline role and schema, then grants the role access to it.
///
/// # Errors
///
/// Returns an error if the schema directory cannot be read or a schema statement fails.
pub async fn init_postgres(
    pg: &PgPool,
    database: &str,
    password: &str,
    schema_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    log::info!("Initializing Postgres database with target permissions and schema");

    // Create public schema
    match sqlx::query("CREATE SCHEMA IF NOT EXISTS public;")
        .execute(pg)
        .await
    {
        Ok(_) => log::info!("Schema public created successfully"),
        Err(e) => log::error!("Error creating schema public: {e:?}"),
    }

    // Create role if not exists
    match sqlx::query(format!("CREATE ROLE {database} PASSWORD '{password}' LOGIN;").as_str())
        .execute(pg)
        .await
    {
        Ok(_) => log::info!("Role {database} created successfully"),
        Err(e) => {
            if e.to_string().contains("already exists") {
                log::info!("Role {database} already exists");
            } else {
                log::error!("Error creating role {database}: {e:?}");
            }
        }
    }

    let schema_dir = match schema_dir {
        Some(dir) => dir,
        None => get_schema_dir()?,
    };
    for file_path in schema_files(&schema_dir)? {
        log::info!("Executing schema file: {}", file_path.display());
        let sql_content = std::fs::read_to_string(&file_path)?;
        for sql_statement in split_statements(&sql_content) {
            if let Err(e) = sqlx::query(&sql_statement).execute(pg).await {
                if e.to_string().contains("already exists") {
                    log::info!("Already exists error on statement, skipping");
                } else {
                    anyhow::bail!("Error executing statement {sql_statement} with error: {e:?}");
                }
            }
        }
    }

    for (grant, description) in [
        (format!("GRANT CONNECT ON DATABASE {database} TO {database};"), "Connect"),
        (format!("GRANT ALL PRIVILEGES ON SCHEMA public TO {database};"), "All schema"),
        (
            format!("GRANT ALL PRIVILEGES ON ALL TABLES IN SCHEMA public TO {database};"),
            "All tables",
        ),
        (
            format!("GRANT ALL PRIVILEGES ON ALL SEQUENCES IN SCHEMA public TO {database};"),
            "All sequences",
        ),
    ] {
        match sqlx::query(&grant).execute(pg).await {
            Ok(_) => log::info!("{description} privileges granted to role {database}"),
            Err(e) => log::error!("Error granting {description} privileges to role {database}: {e:?}"),
        }
    }

    Ok(())
}

/// Drops every object owned by the pipeline role, the public schema and the role itself.
///
/// # Errors
///
/// This function does not fail on individual statement errors; they are logged.
pub async fn drop_postgres(pg: &PgPool, database: &str) -> anyhow::Result<()> {
    let statements = [
        (format!("DROP OWNED BY {database}"), "Dropped owned objects by role"),
        (
            format!("REVOKE CONNECT ON DATABASE {database} FROM {database};"),
            "Revoked connect privileges from role",
        ),
        (
            format!("REVOKE ALL PRIVILEGES ON DATABASE {database} FROM {database};"),
            "Revoked all privileges from role",
        ),
        (
            "DROP SCHEMA IF EXISTS public CASCADE".to_string(),
            "Dropped schema public for role",
        ),
        (format!("DROP ROLE IF EXISTS {database};"), "Dropped role"),
    ];
    for (statement, done) in statements {
        match sqlx::query(&statement).execute(pg).await {
            Ok(_) => log::info!("{done} {database}"),
            Err(e) => log::error!("Error executing '{statement}': {e:?}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_connection_string_from_config() {
        let config = PostgresConfig {
            host: "db".to_string(),
            port: 5433,
            ..Default::default()
        };
        let options = PostgresConnectOptions::from(&config);
        assert_eq!(
            options.connection_string(),
            "postgres://nftsync:pass@db:5433/nftsync"
        );
    }

    #[rstest]
    fn test_builder_defaults() {
        let options = PostgresConnectOptionsBuilder::default()
            .database("other".to_string())
            .build()
            .unwrap();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.database, "other");
    }

    #[rstest]
    fn test_split_statements_skips_comments() {
        let sql = "-- header\nCREATE TABLE a (x INT);\n\n-- trailing comment\n";
        let statements: Vec<String> = split_statements(sql).collect();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("CREATE TABLE a"));
    }

    #[rstest]
    fn test_schema_files_only_sql() {
        let dir = std::env::temp_dir().join(format!("nftsync-schema-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("b.sql"), "SELECT 1;").unwrap();
        std::fs::write(dir.join("a.sql"), "SELECT 1;").unwrap();
        std::fs::write(dir.join("notes.md"), "#").unwrap();

        let files = schema_files(&dir).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.sql", "b.sql"]);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
