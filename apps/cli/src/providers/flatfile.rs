//! Flat-file provider: one JSONL file per entity under a root directory.
//!
//! Built for vendor dumps and offline work. Each line is a JSON object
//! with RFC 3339 `start`/`end` fields naming the span the line describes;
//! the whole line is kept verbatim as the record payload. The entity
//! universe is simply the set of `.jsonl` files in the root.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use histsync_core::errors::{ProviderError, ProviderResult};
use histsync_core::intervals::Interval;
use histsync_core::provider::{FetchCapability, ProviderAdapter, ProviderLimits};
use histsync_core::types::{EntityId, ProviderId, SeriesRecord};

pub struct FlatFileProvider {
    id: ProviderId,
    root: PathBuf,
    limits: ProviderLimits,
}

impl FlatFileProvider {
    pub fn new(id: ProviderId, root: PathBuf, limits: ProviderLimits) -> Self {
        Self { id, root, limits }
    }

    /// Entities available in the root: the stem of every `.jsonl` file,
    /// sorted for stable ALL-expansion.
    pub fn universe(&self) -> ProviderResult<Vec<EntityId>> {
        let entries = fs::read_dir(&self.root).map_err(|e| ProviderError::Unavailable {
            provider: self.id.to_string(),
            message: format!("cannot read {}: {e}", self.root.display()),
        })?;

        let mut entities = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| ProviderError::Unavailable {
                    provider: self.id.to_string(),
                    message: e.to_string(),
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    entities.push(EntityId::new(stem));
                }
            }
        }
        entities.sort();
        Ok(entities)
    }

    fn read_entity(&self, entity: &EntityId, range: Interval) -> ProviderResult<Vec<SeriesRecord>> {
        let path = self.root.join(format!("{entity}.jsonl"));
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            // A missing file is a valid answer: this entity has no data.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ProviderError::Unavailable {
                    provider: self.id.to_string(),
                    message: format!("cannot open {}: {e}", path.display()),
                })
            }
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ProviderError::Unavailable {
                provider: self.id.to_string(),
                message: format!("read error in {}: {e}", path.display()),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let interval = self.parse_line_interval(&path, number + 1, &line)?;
            if interval.overlaps(&range) {
                records.push(SeriesRecord::new(
                    self.id.clone(),
                    entity.clone(),
                    interval,
                    line.into_bytes(),
                ));
            }
        }
        Ok(records)
    }

    fn parse_line_interval(
        &self,
        path: &std::path::Path,
        line_number: usize,
        line: &str,
    ) -> ProviderResult<Interval> {
        let malformed = |message: String| ProviderError::Malformed {
            provider: self.id.to_string(),
            message: format!("{}:{line_number}: {message}", path.display()),
        };

        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| malformed(e.to_string()))?;
        let start = parse_field(&value, "start").map_err(&malformed)?;
        let end = parse_field(&value, "end").map_err(&malformed)?;
        Interval::new(start, end).map_err(|e| malformed(e.to_string()))
    }
}

fn parse_field(value: &serde_json::Value, field: &str) -> Result<DateTime<Utc>, String> {
    let raw = value
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing '{field}' field"))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("bad '{field}' timestamp: {e}"))
}

#[async_trait]
impl ProviderAdapter for FlatFileProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn capability(&self) -> FetchCapability {
        FetchCapability::EntityOnly
    }

    fn limits(&self) -> ProviderLimits {
        self.limits
    }

    async fn fetch_by_entities(
        &self,
        entities: &[EntityId],
        range: Interval,
    ) -> ProviderResult<Vec<SeriesRecord>> {
        let mut records = Vec::new();
        for entity in entities {
            records.extend(self.read_entity(entity, range)?);
        }
        Ok(records)
    }
}

/// Default limits for local files: generous rate, daily data, no lag.
pub fn default_limits() -> ProviderLimits {
    ProviderLimits::new(100, 100_000, Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::TempDir;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, day, 0, 0, 0).unwrap()
    }

    fn iv(a: u32, b: u32) -> Interval {
        Interval::new(ts(a), ts(b)).unwrap()
    }

    fn line(a: u32, b: u32, value: f64) -> String {
        format!(
            r#"{{"start":"2025-04-{a:02}T00:00:00Z","end":"2025-04-{b:02}T00:00:00Z","close":{value}}}"#
        )
    }

    fn write_entity(dir: &TempDir, entity: &str, lines: &[String]) {
        let mut file = fs::File::create(dir.path().join(format!("{entity}.jsonl"))).unwrap();
        for l in lines {
            writeln!(file, "{l}").unwrap();
        }
    }

    fn provider(dir: &TempDir) -> FlatFileProvider {
        FlatFileProvider::new(
            ProviderId::new("flatfile"),
            dir.path().to_path_buf(),
            default_limits(),
        )
    }

    #[tokio::test]
    async fn test_fetch_filters_by_range() {
        let dir = tempfile::tempdir().unwrap();
        write_entity(&dir, "AAPL", &[line(1, 2, 1.0), line(5, 6, 2.0), line(20, 21, 3.0)]);

        let records = provider(&dir)
            .fetch_by_entities(&[EntityId::new("AAPL")], iv(1, 10))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].interval, iv(1, 2));
        assert_eq!(records[1].interval, iv(5, 6));
    }

    #[tokio::test]
    async fn test_missing_file_means_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let records = provider(&dir)
            .fetch_by_entities(&[EntityId::new("GHOST")], iv(1, 10))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_line_is_permanent_error() {
        let dir = tempfile::tempdir().unwrap();
        write_entity(&dir, "BAD", &["not json at all".to_string()]);

        let err = provider(&dir)
            .fetch_by_entities(&[EntityId::new("BAD")], iv(1, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed { .. }));
    }

    #[test]
    fn test_universe_from_directory_scan() {
        let dir = tempfile::tempdir().unwrap();
        write_entity(&dir, "MSFT", &[]);
        write_entity(&dir, "AAPL", &[]);
        fs::File::create(dir.path().join("notes.txt")).unwrap();

        let universe = provider(&dir).universe().unwrap();
        assert_eq!(universe, vec![EntityId::new("AAPL"), EntityId::new("MSFT")]);
    }
}
