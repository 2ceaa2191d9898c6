//! Byte pump with progress reporting.
//!
//! A producer task reads chunks into a bounded channel, a consumer task
//! writes them out and bumps a shared counter, and a sampler task prints the
//! counter against the expected total until the transfer finishes.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use walkdir::WalkDir;

/// Size of each chunk moved through the channel.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between producer and consumer.
pub const CHANNEL_DEPTH: usize = 16;

/// How often the sampler prints.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Transfer progress snapshot.
#[derive(Debug, Clone)]
pub struct Progress {
    pub done: u64,
    pub total: Option<u64>,
    pub percent: Option<u8>,
}

impl Progress {
    pub fn new(done: u64, total: Option<u64>) -> Self {
        let percent = total.map(|t| {
            if t > 0 {
                ((done.saturating_mul(100)) / t).min(100) as u8
            } else {
                100
            }
        });
        Self {
            done,
            total,
            percent,
        }
    }

    /// Format as human-readable string
    pub fn display(&self) -> String {
        match (self.total, self.percent) {
            (Some(total), Some(pct)) => {
                format!("{}/{} ({}%)", human_size(self.done), human_size(total), pct)
            }
            _ => human_size(self.done),
        }
    }
}

/// Format a byte count with a binary unit.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Apparent size of a tree: the sum of regular file lengths, links not followed.
///
/// Entries removed while the walk runs are skipped. A missing `dir` is an error.
pub fn tree_size(dir: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 && vanished(&e) => continue,
            Err(e) => return Err(e).with_context(|| format!("Failed to scan {}", dir.display())),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => total += meta.len(),
            Err(e) if vanished(&e) => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat {}", entry.path().display()))
            }
        }
    }
    Ok(total)
}

/// True when a walk error means the entry disappeared between readdir and stat.
pub(crate) fn vanished(err: &walkdir::Error) -> bool {
    err.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound)
}

/// Size of a single file.
pub fn file_size(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len())
}

/// Copy `reader` into `writer`, printing progress under `label`.
///
/// Returns the number of bytes moved and the flushed, shut down writer.
pub async fn pump<R, W>(reader: R, writer: W, expected: Option<u64>, label: &str) -> Result<(u64, W)>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let counter = Arc::new(AtomicU64::new(0));
    let (tx, rx) = mpsc::channel::<Vec<u8>>(CHANNEL_DEPTH);

    let producer = tokio::spawn(produce(reader, tx));
    let consumer = tokio::spawn(consume(rx, writer, Arc::clone(&counter)));

    let (stop_tx, stop_rx) = oneshot::channel();
    let sampler = tokio::spawn(sample(
        Arc::clone(&counter),
        expected,
        label.to_string(),
        stop_rx,
    ));

    let produced = producer.await.map_err(|e| anyhow!("reader task panicked: {}", e));
    let consumed = consumer.await.map_err(|e| anyhow!("writer task panicked: {}", e));

    let _ = stop_tx.send(());
    let _ = sampler.await;

    let read = produced??;
    let (written, writer) = consumed??;
    debug_assert_eq!(read, written);
    Ok((written, writer))
}

async fn produce<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut total = 0u64;
    loop {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = reader.read(&mut buf).await.context("Failed to read input stream")?;
        if n == 0 {
            return Ok(total);
        }
        buf.truncate(n);
        total += n as u64;
        if tx.send(buf).await.is_err() {
            // Consumer stopped early; its error is the one worth reporting.
            return Ok(total);
        }
    }
}

async fn consume<W>(
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut writer: W,
    counter: Arc<AtomicU64>,
) -> Result<(u64, W)>
where
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    while let Some(chunk) = rx.recv().await {
        writer
            .write_all(&chunk)
            .await
            .context("Failed to write output stream")?;
        total += chunk.len() as u64;
        counter.store(total, Ordering::Relaxed);
    }
    writer.flush().await.context("Failed to flush output stream")?;
    writer
        .shutdown()
        .await
        .context("Failed to close output stream")?;
    Ok((total, writer))
}

async fn sample(
    counter: Arc<AtomicU64>,
    total: Option<u64>,
    label: String,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
    let mut printed = false;
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let progress = Progress::new(counter.load(Ordering::Relaxed), total);
                eprint!("\r  {}: {}", label, progress.display());
                printed = true;
            }
        }
    }
    if printed {
        let progress = Progress::new(counter.load(Ordering::Relaxed), total);
        eprintln!("\r  {}: {}", label, progress.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_progress_percent() {
        assert_eq!(Progress::new(50, Some(200)).percent, Some(25));
        assert_eq!(Progress::new(0, None).percent, None);
        assert_eq!(Progress::new(10, Some(0)).percent, Some(100));
        // tar adds headers and padding beyond the measured tree size
        assert_eq!(Progress::new(300, Some(200)).percent, Some(100));
    }

    #[test]
    fn test_progress_display() {
        assert_eq!(Progress::new(512, None).display(), "512 B");
        assert_eq!(
            Progress::new(1024, Some(2048)).display(),
            "1.0 KiB/2.0 KiB (50%)"
        );
    }

    #[test]
    fn test_human_size_units() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MiB");
        assert_eq!(human_size(1536 * 1024 * 1024), "1.5 GiB");
    }

    #[test]
    fn test_tree_size_counts_files_only() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/one"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("a/b/two"), vec![0u8; 23]).unwrap();
        std::os::unix::fs::symlink("/etc/passwd", dir.path().join("link")).unwrap();
        assert_eq!(tree_size(dir.path()).unwrap(), 123);
    }

    #[test]
    fn test_tree_size_missing_dir_is_error() {
        let dir = TempDir::new().unwrap();
        let err = tree_size(&dir.path().join("gone")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to scan"));
    }

    #[tokio::test]
    async fn test_pump_moves_all_bytes() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let reader = std::io::Cursor::new(data.clone());
        let (moved, out) = pump(reader, Vec::new(), Some(data.len() as u64), "test")
            .await
            .unwrap();
        assert_eq!(moved, data.len() as u64);
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_pump_empty_input() {
        let reader = std::io::Cursor::new(Vec::new());
        let (moved, out) = pump(reader, Vec::new(), None, "empty").await.unwrap();
        assert_eq!(moved, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_pump_into_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let file = tokio::fs::File::create(&path).await.unwrap();
        let reader = std::io::Cursor::new(b"archive bytes".to_vec());
        let (moved, _file) = pump(reader, file, None, "file").await.unwrap();
        assert_eq!(moved, 13);
        assert_eq!(fs::read(&path).unwrap(), b"archive bytes");
    }
}
