//! Environment-driven configuration for the databaser engine.
//!
//! All variables are read once, in [`Config::from_env`], and every missing
//! or malformed value is collected into a single [`ConfigError`] instead of
//! failing on the first problem encountered.

use std::env;
use std::fmt;

const ENV_PREFIX: &str = "DATABASER_";

/// Connection parameters for one side (source or destination) of a transfer.
#[derive(Debug, Clone)]
pub struct DbConnectionParams {
    pub host: String,
    pub port: String,
    pub schema: String,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl DbConnectionParams {
    /// Renders the `host=... port=... dbname=... user=... password=...` template
    /// used to build the cross-database connection string.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.dbname, self.user, self.password
        )
    }
}

/// Fully resolved, validated configuration for one engine run.
#[derive(Debug, Clone)]
pub struct Config {
    pub src_db: DbConnectionParams,
    pub dst_db: DbConnectionParams,

    pub key_table_name: String,
    pub key_column_names: Vec<String>,
    pub key_column_values: Vec<i64>,
    pub key_table_hierarchy_column_name: Option<String>,

    pub excluded_tables: Vec<String>,
    pub tables_with_generic_foreign_key: Vec<String>,
    pub tables_limit_per_transaction: usize,

    pub is_truncate_tables: bool,
    pub tables_truncate_included: Vec<String>,
    pub tables_truncate_excluded: Vec<String>,

    pub full_transfer_tables: Vec<String>,

    pub use_database_for_store_intermediate_values: bool,
    pub collector_chunk_size: usize,
    pub transfer_chunk_size: usize,
    pub async_separation_coefficient: i64,
    pub validate_data_before_transferring: bool,

    pub scratch_table_name: String,

    pub test_mode: bool,
    pub log_level: String,
    pub log_directory: Option<String>,
    pub log_filename: Option<String>,
}

/// All configuration problems found while resolving a [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigError {
    problems: Vec<String>,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "invalid databaser configuration ({} problem(s)):", self.problems.len())?;
        for problem in &self.problems {
            writeln!(f, "  - {problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

/// Accumulates missing/malformed environment variables across the whole
/// resolution pass, so a misconfigured deployment is told everything that is
/// wrong in one report rather than one variable at a time.
struct Collector {
    problems: Vec<String>,
}

impl Collector {
    fn new() -> Self {
        Self { problems: Vec::new() }
    }

    fn required(&mut self, suffix: &str) -> String {
        let name = format!("{ENV_PREFIX}{suffix}");
        match env::var(&name) {
            Ok(value) if !value.is_empty() => value,
            _ => {
                self.problems.push(format!("missing required variable {name}"));
                String::new()
            }
        }
    }

    fn optional(&mut self, suffix: &str, default: &str) -> String {
        let name = format!("{ENV_PREFIX}{suffix}");
        env::var(&name).unwrap_or_else(|_| default.to_string())
    }

    fn optional_opt(&mut self, suffix: &str) -> Option<String> {
        let name = format!("{ENV_PREFIX}{suffix}");
        env::var(&name).ok().filter(|v| !v.is_empty())
    }

    fn csv(&mut self, suffix: &str) -> Vec<String> {
        let name = format!("{ENV_PREFIX}{suffix}");
        env::var(&name)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn int_csv(&mut self, suffix: &str) -> Vec<i64> {
        let name = format!("{ENV_PREFIX}{suffix}");
        let raw = env::var(&name).unwrap_or_default();
        let mut values = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match part.parse::<i64>() {
                Ok(v) => values.push(v),
                Err(_) => self
                    .problems
                    .push(format!("{name} contains a non-integer value: {part:?}")),
            }
        }
        values
    }

    fn bool_flag(&mut self, name_without_prefix: &str, prefixed: bool) -> bool {
        let name = if prefixed {
            format!("{ENV_PREFIX}{name_without_prefix}")
        } else {
            name_without_prefix.to_string()
        };
        matches!(
            env::var(&name).as_deref(),
            Ok("1") | Ok("true") | Ok("TRUE") | Ok("True")
        )
    }

    fn usize_with_default(&mut self, suffix: &str, default: usize) -> usize {
        let name = format!("{ENV_PREFIX}{suffix}");
        match env::var(&name) {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                self.problems
                    .push(format!("{name} is not a valid unsigned integer: {raw:?}"));
                default
            }),
            Err(_) => default,
        }
    }

    fn i64_with_default(&mut self, suffix: &str, default: i64) -> i64 {
        let name = format!("{ENV_PREFIX}{suffix}");
        match env::var(&name) {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                self.problems
                    .push(format!("{name} is not a valid integer: {raw:?}"));
                default
            }),
            Err(_) => default,
        }
    }

    fn db_params(&mut self, side: &str) -> DbConnectionParams {
        DbConnectionParams {
            host: self.required(&format!("{side}_DB_HOST")),
            port: self.required(&format!("{side}_DB_PORT")),
            schema: self.optional(&format!("{side}_DB_SCHEMA"), "public"),
            dbname: self.required(&format!("{side}_DB_DBNAME")),
            user: self.required(&format!("{side}_DB_USER")),
            password: self.required(&format!("{side}_DB_PASSWORD")),
        }
    }
}

impl Config {
    /// Resolves a [`Config`] from `DATABASER_*` environment variables.
    ///
    /// Every missing required variable and every malformed value is reported
    /// together; a `Result::Err` never reflects only the first problem found.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut c = Collector::new();

        let src_db = c.db_params("SRC");
        let dst_db = c.db_params("DST");

        let key_table_name = c.required("KEY_TABLE_NAME");
        let key_column_names = c.csv("KEY_COLUMN_NAMES");
        let key_column_values = c.int_csv("KEY_COLUMN_VALUES");
        let key_table_hierarchy_column_name = c.optional_opt("KEY_TABLE_HIERARCHY_COLUMN_NAME");

        let excluded_tables = c.csv("EXCLUDED_TABLES");
        let tables_with_generic_foreign_key = c.csv("TABLES_WITH_GENERIC_FOREIGN_KEY");
        let tables_limit_per_transaction = c.usize_with_default("TABLES_LIMIT_PER_TRANSACTION", 100);

        let is_truncate_tables = c.bool_flag("IS_TRUNCATE_TABLES", true);
        let tables_truncate_included = c.csv("TABLES_TRUNCATE_INCLUDED");
        let tables_truncate_excluded = c.csv("TABLES_TRUNCATE_EXCLUDED");

        let full_transfer_tables = c.csv("FULL_TRANSFER_TABLES");

        let use_database_for_store_intermediate_values =
            c.bool_flag("USE_DATABASE_FOR_STORE_INTERMEDIATE_VALUES", true);
        let collector_chunk_size = c.usize_with_default("COLLECTOR_CHUNK_SIZE", 60_000);
        let transfer_chunk_size = c.usize_with_default("TRANSFER_CHUNK_SIZE", 30_000);
        let async_separation_coefficient = c.i64_with_default("ASYNC_SEPARATION_COEFFICIENT", -1);
        // Carried over unprefixed from the original settings module.
        let validate_data_before_transferring =
            c.bool_flag("VALIDATE_DATA_BEFORE_TRANSFERRING", false);

        let scratch_table_name = c.optional("SCRATCH_TABLE_NAME", "storage_data");

        let test_mode = c.bool_flag("TEST_MODE", true);
        let log_level = c.optional("LOG_LEVEL", "info");
        let log_directory = c.optional_opt("LOG_DIRECTORY");
        let log_filename = c.optional_opt("LOG_FILENAME");

        if key_column_values.is_empty() && c.problems.iter().all(|p| !p.contains("KEY_COLUMN_VALUES")) {
            c.problems
                .push(format!("{ENV_PREFIX}KEY_COLUMN_VALUES must contain at least one value"));
        }

        if !c.problems.is_empty() {
            return Err(ConfigError { problems: c.problems });
        }

        Ok(Config {
            src_db,
            dst_db,
            key_table_name,
            key_column_names,
            key_column_values,
            key_table_hierarchy_column_name,
            excluded_tables,
            tables_with_generic_foreign_key,
            tables_limit_per_transaction,
            is_truncate_tables,
            tables_truncate_included,
            tables_truncate_excluded,
            full_transfer_tables,
            use_database_for_store_intermediate_values,
            collector_chunk_size,
            transfer_chunk_size,
            async_separation_coefficient,
            validate_data_before_transferring,
            scratch_table_name,
            test_mode,
            log_level,
            log_directory,
            log_filename,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for (key, _) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                env::remove_var(key);
            }
        }
    }

    fn set_minimal_valid() {
        env::set_var("DATABASER_SRC_DB_HOST", "localhost");
        env::set_var("DATABASER_SRC_DB_PORT", "5432");
        env::set_var("DATABASER_SRC_DB_DBNAME", "src");
        env::set_var("DATABASER_SRC_DB_USER", "u");
        env::set_var("DATABASER_SRC_DB_PASSWORD", "p");
        env::set_var("DATABASER_DST_DB_HOST", "localhost");
        env::set_var("DATABASER_DST_DB_PORT", "5433");
        env::set_var("DATABASER_DST_DB_DBNAME", "dst");
        env::set_var("DATABASER_DST_DB_USER", "u");
        env::set_var("DATABASER_DST_DB_PASSWORD", "p");
        env::set_var("DATABASER_KEY_TABLE_NAME", "tenant");
        env::set_var("DATABASER_KEY_COLUMN_NAMES", "tenant_id");
        env::set_var("DATABASER_KEY_COLUMN_VALUES", "7");
    }

    #[test]
    fn reports_every_missing_variable_at_once() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();

        let err = Config::from_env().unwrap_err();
        assert!(err.problems.len() > 5, "expected many missing vars, got {err}");
        assert!(err.problems.iter().any(|p| p.contains("SRC_DB_HOST")));
        assert!(err.problems.iter().any(|p| p.contains("KEY_TABLE_NAME")));

        clear_all();
    }

    #[test]
    fn parses_minimal_valid_configuration() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        set_minimal_valid();

        let config = Config::from_env().expect("minimal config should resolve");
        assert_eq!(config.key_table_name, "tenant");
        assert_eq!(config.key_column_values, vec![7]);
        assert_eq!(config.collector_chunk_size, 60_000);
        assert_eq!(config.scratch_table_name, "storage_data");
        assert!(!config.is_truncate_tables);

        clear_all();
    }

    #[test]
    fn rejects_non_integer_key_column_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        set_minimal_valid();
        env::set_var("DATABASER_KEY_COLUMN_VALUES", "7,not-a-number");

        let err = Config::from_env().unwrap_err();
        assert!(err.problems.iter().any(|p| p.contains("KEY_COLUMN_VALUES")));

        clear_all();
    }
}
