//! Schedule persistence using JSON file storage

use std::path::Path;

use tokio::fs;

use crate::model::ScheduleTable;

/// Load the schedule from a JSON file
pub async fn load_schedule(path: &Path) -> ScheduleTable {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<ScheduleTable>(&contents) {
            Ok(table) => {
                let count: usize = table.values().map(Vec::len).sum();
                tracing::info!("Loaded {} schedule tasks from {:?}", count, path);
                table
            }
            Err(e) => {
                tracing::warn!("Failed to parse schedule file {:?}: {}", path, e);
                ScheduleTable::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No schedule file found at {:?}, starting fresh", path);
            ScheduleTable::new()
        }
        Err(e) => {
            tracing::warn!("Failed to read schedule file {:?}: {}", path, e);
            ScheduleTable::new()
        }
    }
}

/// Save the schedule to a JSON file atomically
#[allow(clippy::missing_errors_doc)]
pub async fn save_schedule(path: &Path, table: &ScheduleTable) -> Result<(), std::io::Error> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    // Serialize to pretty JSON
    let json = serde_json::to_string_pretty(table)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    // Write atomically: write to temp file, then rename
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &json).await?;
    fs::rename(&tmp_path, path).await?;

    tracing::debug!("Saved schedule to {:?}", path);
    Ok(())
}
