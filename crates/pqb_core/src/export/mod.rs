use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::VerifiedQuestion;
use crate::error::AppError;
use crate::fsio::write_atomic;

pub const CSV_FILE: &str = "verified_questions.csv";
pub const JSONL_FILE: &str = "verified_questions.jsonl";
const MANIFEST_FILE: &str = "export_manifest.json";

/// Separator for `golden_chunk_ids` inside a single CSV cell.
pub const GOLDEN_ID_SEPARATOR: &str = "|";

const CSV_HEADER: [&str; 8] = [
    "question_id",
    "question_text",
    "source_paper_id",
    "ground_truth",
    "golden_chunk_ids",
    "difficulty",
    "date_created",
    "notes",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportFileInfo {
    pub filename: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportManifest {
    pub manifest_version: u32,
    pub export_time: String,
    pub question_count: usize,
    pub files: Vec<ExportFileInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportResult {
    pub export_dir: String,
    pub question_count: usize,
}

fn filename_safe_timestamp(export_time: &str) -> String {
    export_time
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            _ => '_',
        })
        .collect()
}

pub fn to_csv_string(rows: &[VerifiedQuestion]) -> Result<String, AppError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());
    let csv_err = |e: csv::Error| {
        AppError::new("EXPORT_CSV_FAILED", "Failed to encode verified questions as CSV")
            .with_details(e.to_string())
    };
    wtr.write_record(CSV_HEADER).map_err(csv_err)?;
    for r in rows {
        let golden = r.golden_chunk_ids.join(GOLDEN_ID_SEPARATOR);
        wtr.write_record([
            r.question_id.as_str(),
            r.question_text.as_str(),
            r.source_paper_id.as_str(),
            r.ground_truth.as_str(),
            golden.as_str(),
            r.difficulty.as_str(),
            r.date_created.as_str(),
            r.notes.as_str(),
        ])
        .map_err(csv_err)?;
    }
    let bytes = wtr.into_inner().map_err(|e| {
        AppError::new("EXPORT_CSV_FAILED", "Failed to flush CSV writer").with_details(e.to_string())
    })?;
    String::from_utf8(bytes).map_err(|e| {
        AppError::new("EXPORT_CSV_FAILED", "CSV output is not valid UTF-8").with_details(e.to_string())
    })
}

/// One JSON object per line, same key set as `verified_questions.json`.
pub fn to_jsonl_string(rows: &[VerifiedQuestion]) -> Result<String, AppError> {
    let mut out = String::new();
    for r in rows {
        let line = serde_json::to_string(r).map_err(|e| {
            AppError::new("EXPORT_JSONL_FAILED", "Failed to encode verified question")
                .with_details(format!("question_id={}; err={}", r.question_id, e))
        })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

fn file_info(filename: &str, body: &[u8]) -> ExportFileInfo {
    ExportFileInfo {
        filename: filename.to_string(),
        bytes: body.len() as u64,
        sha256: hex::encode(Sha256::digest(body)),
    }
}

/// Write the verified dataset into a fresh `BenchmarkExport_<time>` folder under `destination_dir`.
pub fn export_dataset(
    rows: &[VerifiedQuestion],
    destination_dir: &Path,
    export_time: &str,
) -> Result<ExportResult, AppError> {
    if !destination_dir.is_dir() {
        return Err(AppError::new(
            "EXPORT_DEST_NOT_DIR",
            "Export destination must be an existing directory",
        )
        .with_details(destination_dir.display().to_string()));
    }
    let export_dir = destination_dir.join(format!(
        "BenchmarkExport_{}",
        filename_safe_timestamp(export_time)
    ));
    if export_dir.exists() {
        return Err(AppError::new(
            "EXPORT_DEST_EXISTS",
            "Export destination folder already exists",
        )
        .with_details(export_dir.display().to_string()));
    }
    fs::create_dir_all(&export_dir).map_err(|e| {
        AppError::new("EXPORT_MKDIR_FAILED", "Failed to create export directory")
            .with_details(format!("path={}: {}", export_dir.display(), e))
    })?;

    let csv_body = to_csv_string(rows)?;
    let jsonl_body = to_jsonl_string(rows)?;
    let mut files = Vec::new();
    for (name, body) in [(CSV_FILE, csv_body.as_bytes()), (JSONL_FILE, jsonl_body.as_bytes())] {
        write_atomic(&export_dir.join(name), body, "EXPORT_WRITE_FAILED", "export file")?;
        files.push(file_info(name, body));
    }

    let manifest = ExportManifest {
        manifest_version: 1,
        export_time: export_time.to_string(),
        question_count: rows.len(),
        files,
    };
    let manifest_json = serde_json::to_string_pretty(&manifest).map_err(|e| {
        AppError::new("EXPORT_WRITE_FAILED", "Failed to encode export manifest")
            .with_details(e.to_string())
    })?;
    write_atomic(
        &export_dir.join(MANIFEST_FILE),
        manifest_json.as_bytes(),
        "EXPORT_WRITE_FAILED",
        "export manifest",
    )?;

    tracing::info!(export_dir = %export_dir.display(), questions = rows.len(), "dataset exported");
    Ok(ExportResult {
        export_dir: export_dir.to_string_lossy().to_string(),
        question_count: rows.len(),
    })
}
