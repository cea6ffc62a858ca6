use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::model::{Event, Group};

/// Directory holding the event and group snapshots supplied by the backend.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub events_path: PathBuf,
    pub groups_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let events_path = data_dir.join("events.data");
        let groups_path = data_dir.join("groups.data");

        for path in [&events_path, &groups_path] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            events = %events_path.display(),
            groups = %groups_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            events_path,
            groups_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_events(&self) -> anyhow::Result<Vec<Event>> {
        load_jsonl(&self.events_path).context("failed to load events.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_groups(&self) -> anyhow::Result<Vec<Group>> {
        load_jsonl(&self.groups_path).context("failed to load groups.data")
    }

    #[tracing::instrument(skip(self, events))]
    pub fn save_events(&self, events: &[Event]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.events_path, events).context("failed to save events.data")
    }

    #[tracing::instrument(skip(self, groups))]
    pub fn save_groups(&self, groups: &[Group]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.groups_path, groups).context("failed to save groups.data")
    }
}

/// Accepts either a JSON array or one JSON object per line.
pub fn parse_records<T: DeserializeOwned>(raw: &str) -> anyhow::Result<Vec<T>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("failed parsing JSON array");
    }

    let mut out = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing line {}", idx + 1))?;
        out.push(record);
    }
    Ok(out)
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
