use std::path::Path;
use std::process::Command;

use ytpub_worker::{AppConfig, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={} queue_dir={}",
        config.work_dir.display(),
        config.queue.queue_dir.display()
    );
    ensure_dir(&config.work_dir).await?;
    ensure_dir(&config.queue.queue_dir).await?;
    ensure_dir(&config.queue.archive_dir).await?;
    ensure_dir(&config.scheduler.schedule_dir).await?;
    ensure_tool("ffmpeg")?;
    ensure_tool("ffprobe")?;

    let settings = AppConfig::load(&config.config_path)
        .map_err(|e| anyhow::anyhow!("config {} invalid: {}", config.config_path.display(), e))?;
    if settings.subtitles.enabled {
        ensure_tool("whisper")?;
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

fn ensure_tool(name: &str) -> anyhow::Result<()> {
    let path = which::which(name).map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;
    let output = Command::new(&path)
        .arg(if name == "whisper" { "--help" } else { "-version" })
        .output()
        .map_err(|e| anyhow::anyhow!("{} not runnable: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("{} check failed: {:?}", name, output.status));
    }
    Ok(())
}
