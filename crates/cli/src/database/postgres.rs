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

use nftsync_common::config::PostgresConfig;
use nftsync_infrastructure::sql::pg::{
    PostgresConnectOptions, connect_pg, drop_postgres, init_postgres,
};

use crate::opt::{DatabaseCommand, DatabaseConfig, DatabaseOpt};

/// Returns the connection options of a database command, overriding `defaults` with the
/// values given on the command line.
#[must_use]
pub fn get_postgres_connect_options(
    config: DatabaseConfig,
    defaults: &PostgresConfig,
) -> PostgresConnectOptions {
    let defaults = PostgresConnectOptions::from(defaults);
    PostgresConnectOptions::new(
        config.host.unwrap_or(defaults.host),
        config.port.unwrap_or(defaults.port),
        config.username.unwrap_or(defaults.username),
        config.password.unwrap_or(defaults.password),
        config.database.unwrap_or(defaults.database),
    )
}

/// Runs a database management command.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a schema statement fails.
pub async fn run_database_command(
    opt: DatabaseOpt,
    defaults: &PostgresConfig,
) -> anyhow::Result<()> {
    let command = opt.command.clone();

    match command {
        DatabaseCommand::Init(config) => {
            let schema = config.schema.clone();
            let pg_connect_options = get_postgres_connect_options(config, defaults);
            let pg = connect_pg(pg_connect_options.clone().into(), 1).await?;
            tracing::info!(
                "Connected with Postgres at {}:{}/{}",
                pg_connect_options.host,
                pg_connect_options.port,
                pg_connect_options.database
            );
            init_postgres(
                &pg,
                &pg_connect_options.database,
                &pg_connect_options.password,
                schema,
            )
            .await?;
        }
        DatabaseCommand::Drop(config) => {
            let pg_connect_options = get_postgres_connect_options(config, defaults);
            let pg = connect_pg(pg_connect_options.clone().into(), 1).await?;
            tracing::info!(
                "Connected with Postgres at {}:{}/{}",
                pg_connect_options.host,
                pg_connect_options.port,
                pg_connect_options.database
            );
            drop_postgres(&pg, &pg_connect_options.database).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_command_line_overrides_config() {
        let config = DatabaseConfig {
            host: Some("db.internal".to_string()),
            port: None,
            username: None,
            database: Some("nft".to_string()),
            password: None,
            schema: None,
        };
        let options = get_postgres_connect_options(config, &PostgresConfig::default());

        assert_eq!(options.host, "db.internal");
        assert_eq!(options.port, 5432);
        assert_eq!(options.username, "nftsync");
        assert_eq!(options.database, "nft");
    }
}
