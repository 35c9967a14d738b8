//! JSON output formatting

use aircheck_core::{RecognitionReport, Song};
use serde::Serialize;

#[derive(Serialize)]
struct IngestOutput<'a> {
    song_id: i32,
    song_name: &'a str,
    total_hashes: i64,
    duration_ms: i64,
}

/// Print the recognition report as `{"results": [...]}`
pub fn print_json_report(report: &RecognitionReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing report: {}", e),
    }
}

/// Print the per-chunk detections behind a report
pub fn print_json_chunks(report: &RecognitionReport) {
    match serde_json::to_string_pretty(&report.chunks) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing chunk detections: {}", e),
    }
}

/// Print a one-line ingestion summary for a song
pub fn print_json_song(song: &Song) {
    let output = IngestOutput {
        song_id: song.song_id,
        song_name: &song.song_name,
        total_hashes: song.total_hashes,
        duration_ms: song.duration_ms,
    };
    match serde_json::to_string(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing song: {}", e),
    }
}
