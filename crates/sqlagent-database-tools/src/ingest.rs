//! Upload persistence and CSV to SQLite conversion

use crate::database::{quote_ident, SqlDatabase};
use sqlagent_core::{Error, Result, StorageConfig};
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions};
use sqlx::{Connection, Sqlite, SqliteConnection};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of dataset a user says they are uploading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Csv,
    Sqlite,
}

impl DatasetKind {
    /// Extensions accepted for this kind
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Csv => &["csv"],
            DatasetKind::Sqlite => &["sqlite", "db"],
        }
    }

    pub fn accepts(&self, file_name: &str) -> bool {
        let extension = extension_of(file_name);
        self.extensions().contains(&extension.as_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Csv => "csv",
            DatasetKind::Sqlite => "sqlite",
        }
    }
}

impl FromStr for DatasetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(DatasetKind::Csv),
            "sqlite" => Ok(DatasetKind::Sqlite),
            other => Err(Error::dataset(format!("Unknown file type: {}", other))),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an upload became a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedSource {
    ConvertedCsv,
    CopiedSqlite,
    /// Unsupported extension; the default database is used instead
    Fallback,
}

/// Result of persisting an upload
#[derive(Debug, Clone, PartialEq)]
pub struct SavedDataset {
    pub path: PathBuf,
    pub source: SavedSource,
    /// Table the CSV rows were written to
    pub table: Option<String>,
    pub rows: Option<u64>,
}

/// Where uploads are stored
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub assets_dir: PathBuf,
    pub default_database: PathBuf,
    pub csv_table: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for IngestConfig {
    fn from(storage: &StorageConfig) -> Self {
        Self {
            assets_dir: storage.assets_dir.clone(),
            default_database: storage.default_database.clone(),
            csv_table: storage.csv_table.clone(),
        }
    }
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hidden file next to the final location that an upload is written to first
fn staging_path(dir: &Path, file_name: &str) -> PathBuf {
    let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(".{}.{}.{}.part", file_name, std::process::id(), n))
}

/// Persist an uploaded file and return the path of a SQLite database for it
///
/// CSV files are converted into `<assets_dir>/<stem>.db`; SQLite files are
/// stored as-is. Any other extension falls back to the default database.
pub async fn save_uploaded_file(
    file_name: &str,
    bytes: &[u8],
    config: &IngestConfig,
) -> Result<SavedDataset> {
    let file_name = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::dataset("Uploaded file has no name"))?;

    match extension_of(file_name).as_str() {
        "csv" => {
            tokio::fs::create_dir_all(&config.assets_dir).await?;
            let stem = Path::new(file_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("upload");
            let db_path = config.assets_dir.join(format!("{}.db", stem));

            let rows = csv_to_sqlite(bytes, &db_path, &config.csv_table).await?;
            tracing::info!(
                file = file_name,
                path = %db_path.display(),
                table = %config.csv_table,
                rows,
                "Converted CSV upload to SQLite"
            );

            Ok(SavedDataset {
                path: db_path,
                source: SavedSource::ConvertedCsv,
                table: Some(config.csv_table.clone()),
                rows: Some(rows),
            })
        }
        "sqlite" | "db" => {
            tokio::fs::create_dir_all(&config.assets_dir).await?;
            let db_path = config.assets_dir.join(file_name);
            let staged = staging_path(&config.assets_dir, file_name);
            tokio::fs::write(&staged, bytes).await?;

            // verified before replacing anything already stored under the name
            let verified = match SqlDatabase::open(&staged).await {
                Ok(db) => {
                    db.close().await;
                    tokio::fs::rename(&staged, &db_path).await.map_err(Error::from)
                }
                Err(e) => Err(Error::dataset(format!(
                    "{} is not a readable SQLite database: {}",
                    file_name, e
                ))),
            };
            if let Err(e) = verified {
                if let Err(remove_err) = tokio::fs::remove_file(&staged).await {
                    tracing::warn!(error = %remove_err, path = %staged.display(), "Failed to remove rejected upload");
                }
                return Err(e);
            }

            tracing::info!(file = file_name, path = %db_path.display(), "Stored SQLite upload");
            Ok(SavedDataset {
                path: db_path,
                source: SavedSource::CopiedSqlite,
                table: None,
                rows: None,
            })
        }
        _ => {
            tracing::warn!(
                file = file_name,
                fallback = %config.default_database.display(),
                "Unsupported file type"
            );
            Ok(SavedDataset {
                path: config.default_database.clone(),
                source: SavedSource::Fallback,
                table: None,
                rows: None,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Integer,
    Real,
    Text,
}

impl Affinity {
    fn as_sql(&self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Real => "REAL",
            Affinity::Text => "TEXT",
        }
    }

    /// Narrowest affinity holding every non-empty cell of a column
    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut affinity = Affinity::Integer;
        let mut seen = false;

        for cell in cells.filter(|c| !c.is_empty()) {
            seen = true;
            if affinity == Affinity::Integer && cell.parse::<i64>().is_err() {
                affinity = Affinity::Real;
            }
            if affinity == Affinity::Real && cell.parse::<f64>().is_err() {
                return Affinity::Text;
            }
        }

        if seen { affinity } else { Affinity::Text }
    }
}

/// Column names from a header row: blanks become `Unnamed: <i>`, repeats get
/// `.<n>` suffixes. SQLite compares column names case-insensitively.
fn normalize_headers(headers: &csv::StringRecord) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(headers.len());

    for (i, header) in headers.iter().enumerate() {
        let base = match header.trim() {
            "" => format!("Unnamed: {}", i),
            name => name.to_string(),
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while !seen.insert(name.to_lowercase()) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        names.push(name);
    }

    names
}

/// Parse CSV `bytes` (header row first) into table `table` of the SQLite
/// file at `db_path`, replacing any existing table of that name
///
/// Returns the number of rows inserted.
pub async fn csv_to_sqlite(bytes: &[u8], db_path: &Path, table: &str) -> Result<u64> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| Error::dataset(format!("Failed to read CSV header: {}", e)))?
        .clone();
    if headers.is_empty() {
        return Err(Error::dataset("CSV file has no columns"));
    }
    let columns = normalize_headers(&headers);

    let mut records: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::dataset(format!("Failed to parse CSV: {}", e)))?;
        if record.len() > columns.len() {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            return Err(Error::dataset(format!(
                "CSV line {} has {} fields, expected {}",
                line,
                record.len(),
                columns.len()
            )));
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(columns.len(), String::new());
        records.push(row);
    }

    let affinities: Vec<Affinity> = (0..columns.len())
        .map(|i| Affinity::infer(records.iter().map(|row| row[i].as_str())))
        .collect();

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .map_err(|e| Error::database(format!("Failed to open {}: {}", db_path.display(), e)))?;

    let table_ident = quote_ident(table);
    let column_defs: Vec<String> = columns
        .iter()
        .zip(&affinities)
        .map(|(name, affinity)| format!("{} {}", quote_ident(name), affinity.as_sql()))
        .collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let insert_sql = format!("INSERT INTO {} VALUES ({})", table_ident, placeholders);

    let mut tx = conn.begin().await.map_err(db_error)?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table_ident))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
    sqlx::query(&format!(
        "CREATE TABLE {} ({})",
        table_ident,
        column_defs.join(", ")
    ))
    .execute(&mut *tx)
    .await
    .map_err(db_error)?;

    for row in &records {
        let mut query = sqlx::query(&insert_sql);
        for (cell, affinity) in row.iter().zip(&affinities) {
            query = bind_cell(query, cell, *affinity);
        }
        query.execute(&mut *tx).await.map_err(db_error)?;
    }

    tx.commit().await.map_err(db_error)?;
    conn.close().await.map_err(db_error)?;

    Ok(records.len() as u64)
}

fn bind_cell<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    cell: &'q str,
    affinity: Affinity,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    if cell.is_empty() {
        return query.bind(None::<String>);
    }
    match affinity {
        Affinity::Integer => match cell.parse::<i64>() {
            Ok(v) => query.bind(v),
            Err(_) => query.bind(cell),
        },
        Affinity::Real => match cell.parse::<f64>() {
            Ok(v) => query.bind(v),
            Err(_) => query.bind(cell),
        },
        Affinity::Text => query.bind(cell),
    }
}

fn db_error(e: sqlx::Error) -> Error {
    Error::database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> IngestConfig {
        IngestConfig {
            assets_dir: dir.path().join("db"),
            default_database: dir.path().join("db").join("Chinook.db"),
            csv_table: "data".to_string(),
        }
    }

    #[test]
    fn test_dataset_kind_parsing() {
        assert_eq!("CSV".parse::<DatasetKind>().unwrap(), DatasetKind::Csv);
        assert_eq!("sqlite".parse::<DatasetKind>().unwrap(), DatasetKind::Sqlite);
        assert!("xlsx".parse::<DatasetKind>().is_err());

        assert!(DatasetKind::Sqlite.accepts("chinook.DB"));
        assert!(DatasetKind::Sqlite.accepts("store.sqlite"));
        assert!(!DatasetKind::Csv.accepts("store.sqlite"));
    }

    #[test]
    fn test_normalize_headers() {
        let headers = csv::StringRecord::from(vec!["id", "", "Name", "name", "id"]);
        assert_eq!(
            normalize_headers(&headers),
            vec!["id", "Unnamed: 1", "Name", "name.1", "id.1"]
        );
    }

    #[test]
    fn test_affinity_inference() {
        assert_eq!(Affinity::infer(["1", "", "42"].into_iter()), Affinity::Integer);
        assert_eq!(Affinity::infer(["1", "2.5"].into_iter()), Affinity::Real);
        assert_eq!(Affinity::infer(["1", "n/a"].into_iter()), Affinity::Text);
        assert_eq!(Affinity::infer(["", ""].into_iter()), Affinity::Text);
    }

    #[tokio::test]
    async fn test_csv_upload_becomes_database() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let csv = b"city,population,area\nOslo,709037,454.0\nBergen,291940,\nTromso,,2521.5\n";

        let saved = save_uploaded_file("cities.csv", csv, &config).await.unwrap();

        assert_eq!(saved.path, dir.path().join("db").join("cities.db"));
        assert_eq!(saved.source, SavedSource::ConvertedCsv);
        assert_eq!(saved.table.as_deref(), Some("data"));
        assert_eq!(saved.rows, Some(3));

        let db = SqlDatabase::open(&saved.path).await.unwrap();
        assert_eq!(db.usable_table_names().await.unwrap(), vec!["data"]);

        let info = db.describe_table("data").await.unwrap();
        let types: Vec<&str> = info.columns.iter().map(|c| c.data_type.as_str()).collect();
        assert_eq!(types, vec!["TEXT", "INTEGER", "REAL"]);

        let result = db
            .run("SELECT city, population FROM data WHERE population IS NULL", 10)
            .await
            .unwrap();
        assert_eq!(result.rows, vec![vec![serde_json::json!("Tromso"), serde_json::Value::Null]]);
    }

    #[tokio::test]
    async fn test_csv_upload_replaces_table() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        save_uploaded_file("sales.csv", b"a,b\n1,2\n3,4\n", &config).await.unwrap();
        let saved = save_uploaded_file("sales.csv", b"x\nfoo\n", &config).await.unwrap();

        let db = SqlDatabase::open(&saved.path).await.unwrap();
        let result = db.run("SELECT * FROM data", 10).await.unwrap();
        assert_eq!(result.columns, vec!["x"]);
        assert_eq!(result.row_count(), 1);
    }

    #[tokio::test]
    async fn test_csv_short_rows_padded_and_long_rows_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pad.db");

        let rows = csv_to_sqlite(b"a,b,c\n1\n", &path, "data").await.unwrap();
        assert_eq!(rows, 1);

        let err = csv_to_sqlite(b"a,b\n1,2\n1,2,3\n", &path, "data")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("CSV line 3 has 3 fields, expected 2"));
    }

    #[tokio::test]
    async fn test_sqlite_upload_is_copied() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let source = dir.path().join("source.db");
        csv_to_sqlite(b"id,name\n1,Ada\n", &source, "people").await.unwrap();
        let bytes = std::fs::read(&source).unwrap();

        let saved = save_uploaded_file("../../people.sqlite", &bytes, &config)
            .await
            .unwrap();

        assert_eq!(saved.path, dir.path().join("db").join("people.sqlite"));
        assert_eq!(saved.source, SavedSource::CopiedSqlite);
        let db = SqlDatabase::open(&saved.path).await.unwrap();
        assert_eq!(db.usable_table_names().await.unwrap(), vec!["people"]);
    }

    #[tokio::test]
    async fn test_corrupt_sqlite_upload_is_removed() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let result = save_uploaded_file(
            "broken.db",
            b"definitely not a database file, just text that is long enough",
            &config,
        )
        .await;

        assert!(result.is_err());
        assert!(!dir.path().join("db").join("broken.db").exists());
    }

    #[tokio::test]
    async fn test_rejected_reupload_keeps_stored_database() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let source = dir.path().join("source.db");
        csv_to_sqlite(b"sku,qty\nA1,4\n", &source, "stock").await.unwrap();
        let bytes = std::fs::read(&source).unwrap();
        let saved = save_uploaded_file("shop.db", &bytes, &config).await.unwrap();

        let result = save_uploaded_file("shop.db", b"garbage that is not sqlite at all", &config).await;
        assert!(result.is_err());

        let db = SqlDatabase::open(&saved.path).await.unwrap();
        assert_eq!(db.usable_table_names().await.unwrap(), vec!["stock"]);
        let leftovers: Vec<_> = std::fs::read_dir(&config.assets_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_extension_falls_back() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let saved = save_uploaded_file("report.xlsx", b"PK", &config).await.unwrap();

        assert_eq!(saved.source, SavedSource::Fallback);
        assert_eq!(saved.path, config.default_database);
        assert!(!config.assets_dir.exists());
    }
}
