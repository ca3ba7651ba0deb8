//! File-based request and stream diagnostics.
//!
//! Logging here is best-effort: callers ignore failures (`let _ = ...`) so a
//! full disk or read-only home directory never breaks a conversation.
//! Secret material is never written; API keys are reduced to a short prefix.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Get or create the base lumen directory (~/.lumen).
pub fn lumen_dir() -> Result<PathBuf> {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Failed to get home directory")?;

    let dir = PathBuf::from(home_dir).join(".lumen");
    if !dir.exists() {
        std::fs::create_dir_all(&dir).context("Failed to create lumen directory")?;
    }
    Ok(dir)
}

/// Get or create the logs directory (~/.lumen/logs).
pub fn logs_dir() -> Result<PathBuf> {
    let dir = lumen_dir()?.join("logs");
    if !dir.exists() {
        std::fs::create_dir_all(&dir).context("Failed to create logs directory")?;
    }
    Ok(dir)
}

/// Safely truncate a string to a maximum number of characters.
pub fn safe_truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let trunc_chars = if max_chars >= 3 { max_chars - 3 } else { 0 };
        format!("{}...", s.chars().take(trunc_chars).collect::<String>())
    }
}

/// Redact an API key down to a recognizable prefix.
pub fn redact_key(key: &str) -> String {
    format!("{}***", key.chars().take(8).collect::<String>())
}

/// Write one outgoing provider request to a timestamped log file.
pub fn log_request_to_file(
    provider_id: &str,
    url: &str,
    body: &serde_json::Value,
    api_key: Option<&str>,
) -> Result<()> {
    let dir = logs_dir()?;
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let filename = dir.join(format!("req-{}-{}.txt", timestamp, provider_id));

    let mut log_content = String::new();
    log_content.push_str("PROVIDER REQUEST LOG\n");
    log_content.push_str("====================\n\n");
    log_content.push_str(&format!("Provider: {}\n", provider_id));
    log_content.push_str(&format!("URL: {}\n", url));
    match api_key {
        Some(key) => log_content.push_str(&format!("Key: {}\n\n", redact_key(key))),
        None => log_content.push_str("Key: (none)\n\n"),
    }
    log_content.push_str("Request Body:\n");
    match serde_json::to_string_pretty(body) {
        Ok(json) => {
            log_content.push_str(&json);
            log_content.push('\n');
        }
        Err(e) => {
            log_content.push_str(&format!("Error serializing request: {}\n", e));
        }
    }

    std::fs::write(&filename, log_content)
        .with_context(|| format!("Failed to write request log to {}", filename.display()))?;

    Ok(())
}

/// Diagnostic trace for a streaming boundary channel.
///
/// Records the payload *shape* (top-level field names and byte length) so
/// stream routing can be debugged without logging content.
pub fn log_stream_event(channel: &str, request_id: &str, payload: &serde_json::Value) -> Result<()> {
    let dir = logs_dir()?;
    let filename = dir.join("stream-trace.log");

    let shape = match payload.as_object() {
        Some(map) => map.keys().cloned().collect::<Vec<_>>().join(","),
        None => payload
            .as_str()
            .map(|_| "text".to_string())
            .unwrap_or_else(|| "scalar".to_string()),
    };
    let line = format!(
        "{} channel={} request={} fields=[{}] bytes={}\n",
        chrono::Utc::now().to_rfc3339(),
        channel,
        request_id,
        shape,
        payload.to_string().len(),
    );

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&filename)
        .with_context(|| format!("Failed to open {}", filename.display()))?;
    file.write_all(line.as_bytes())
        .context("Failed to append stream trace")?;

    Ok(())
}
