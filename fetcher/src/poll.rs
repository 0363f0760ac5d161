//! The poll loop: list matching remote files, download each one, move the
//! original into the archive folder.

use std::path::PathBuf;

use crate::config::Config;
use crate::drive::{build_query, DriveClient, DriveError, DriveFile};

/// Collision-resistant local name: minute-granularity timestamp prefix plus
/// the original remote name.
pub fn local_name(original: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M");
    format!("{}_{}", timestamp, original)
}

/// Download one remote file, then move the original into the archive folder.
///
/// The archive move is best-effort: a failure there is logged and swallowed,
/// and the already-downloaded local file is kept either way.
pub async fn download_and_archive(
    client: &DriveClient,
    config: &Config,
    file: &DriveFile,
) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(&config.download_dir).await?;

    let dest = config.download_dir.join(local_name(&file.name));
    let written = client.download_to(file, &dest).await?;
    tracing::info!(path = %dest.display(), bytes = written, "downloaded");

    match &config.archive_folder_id {
        Some(archive) => {
            if let Err(e) = archive_remote(client, archive, file).await {
                tracing::error!(file = %file.name, "error moving to archive: {e}");
            }
        }
        None => {
            // The file stays in place and will be re-listed (and re-downloaded)
            // next cycle.
            tracing::warn!(file = %file.name, "ARCHIVE_FOLDER_ID not set, skipping move");
        }
    }

    Ok(dest)
}

async fn archive_remote(
    client: &DriveClient,
    archive: &str,
    file: &DriveFile,
) -> Result<(), DriveError> {
    let prev_parents = client.parents(&file.id).await?;
    client.move_to_folder(&file.id, archive, &prev_parents).await?;
    tracing::info!(file = %file.name, "moved to archive folder (remote name unchanged)");
    Ok(())
}

/// One poll cycle: list, then process each file sequentially. An error while
/// downloading aborts the rest of the batch and propagates to the caller.
pub async fn run_once(client: &DriveClient, config: &Config) -> anyhow::Result<()> {
    let query = build_query(&config.query, config.folder_id.as_deref());
    let files = client.list_files(&query).await?;
    if !files.is_empty() {
        tracing::info!(count = files.len(), "found image(s)");
    }
    for file in &files {
        tracing::debug!(
            id = %file.id,
            name = %file.name,
            mime = %file.mime_type,
            size = ?file.size_bytes(),
            "listed"
        );
        download_and_archive(client, config, file).await?;
    }
    Ok(())
}

/// Endless poll loop. Cycle errors are treated as transient: logged, then the
/// loop sleeps and tries again. Terminates only with the process.
pub async fn run(client: &DriveClient, config: &Config) {
    tracing::info!("started, monitoring Drive for images");
    loop {
        if let Err(e) = run_once(client, config).await {
            tracing::error!("poll cycle failed: {e:#}");
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}
