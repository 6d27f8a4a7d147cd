#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use csv_importer::upload::UploadedFile;
use tempfile::{TempDir, tempdir};

/// Builds an in-memory upload with the given client filename.
pub fn upload(filename: &str, contents: &str) -> UploadedFile {
    UploadedFile::new(filename, contents.as_bytes())
}

/// A fixed UTC instant at the given second, for reproducible table names.
pub fn at_second(secs: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, secs)
        .single()
        .expect("valid timestamp")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// SQLite connection string for a database file inside the workspace.
    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.path().join("imports.db").display())
    }
}
