//! Upload tracker persistence

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Upload, UploadList, UploadStatus};
use crate::tracker::UploadState;

fn row_to_upload(row: &Row) -> rusqlite::Result<Upload> {
    let status: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(Upload {
        id: row.get(0)?,
        year: row.get(1)?,
        bank: row.get(2)?,
        status: status.parse().unwrap_or_default(),
        progress: row.get(4)?,
        message: row.get(5)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

const UPLOAD_COLUMNS: &str =
    "id, year, bank, status, progress, message, created_at, updated_at";

impl Database {
    /// Persist an upload state, keyed on (year, bank)
    ///
    /// Last write wins: an existing row is overwritten in place, whatever its
    /// current status.
    pub fn save_upload(&self, year: i32, bank: &str, state: &UploadState) -> Result<Upload> {
        if !(0..=100).contains(&state.progress) {
            return Err(Error::InvalidData(format!(
                "Upload progress out of range: {}",
                state.progress
            )));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO uploads (year, bank, status, progress, message)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(year, bank) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                message = excluded.message,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                year,
                bank,
                state.status.as_str(),
                state.progress,
                state.message
            ],
        )?;

        let sql = format!(
            "SELECT {} FROM uploads WHERE year = ? AND bank = ?",
            UPLOAD_COLUMNS
        );
        let upload = conn.query_row(&sql, params![year, bank], row_to_upload)?;
        Ok(upload)
    }

    /// Reserve an ingestion slot: the upload becomes pending with no progress
    pub fn reserve_upload(&self, year: i32, bank: &str) -> Result<Upload> {
        self.save_upload(year, bank, &UploadState::pending())
    }

    /// Get the upload for one (year, bank) pair
    pub fn get_upload(&self, year: i32, bank: &str) -> Result<Option<Upload>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM uploads WHERE year = ? AND bank = ?",
            UPLOAD_COLUMNS
        );
        let upload = conn
            .query_row(&sql, params![year, bank], row_to_upload)
            .optional()?;
        Ok(upload)
    }

    /// List every upload, newest year first then by bank
    pub fn list_uploads(&self) -> Result<UploadList> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM uploads ORDER BY year DESC, bank ASC",
            UPLOAD_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let uploads = stmt
            .query_map([], row_to_upload)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total = uploads.len() as i64;
        Ok(UploadList {
            uploads,
            total,
            offset: 0,
            limit: total,
        })
    }

    /// Fail uploads left in progress by a process that exited mid-run
    ///
    /// Returns how many rows were recovered.
    pub fn recover_interrupted_uploads(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.execute(
            r#"UPDATE uploads SET
                status = 'failed',
                progress = 0,
                message = 'Processing failed: interrupted by restart, upload the sheet again',
                updated_at = CURRENT_TIMESTAMP
            WHERE status = 'in_progress'"#,
            [],
        )?;
        Ok(count as i64)
    }

    /// Count uploads in a given status
    pub fn count_uploads_by_status(&self, status: UploadStatus) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM uploads WHERE status = ?",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
