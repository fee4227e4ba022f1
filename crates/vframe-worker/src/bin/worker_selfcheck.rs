use std::path::Path;
use std::process::Command;

use vframe_media::resolve_ffmpeg;
use vframe_queue::NotifierConfig;
use vframe_storage::S3Store;
use vframe_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_ffmpeg(config.ffmpeg_path.as_deref())?;
    ensure_queues()?;
    ensure_bucket(&config.dest_bucket).await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_ffmpeg(configured: Option<&str>) -> anyhow::Result<()> {
    let ffmpeg = resolve_ffmpeg(configured)?;
    let output = Command::new(&ffmpeg)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not runnable: {}", ffmpeg.display(), e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} -version failed: {:?}",
            ffmpeg.display(),
            output.status
        ));
    }
    Ok(())
}

fn ensure_queues() -> anyhow::Result<()> {
    let config = NotifierConfig::from_env()?;
    println!(
        "worker-selfcheck: success queue {}, error queue {}",
        config.success_queue, config.error_queue
    );
    Ok(())
}

async fn ensure_bucket(bucket: &str) -> anyhow::Result<()> {
    let store = S3Store::from_env().await?;
    store.check_bucket(bucket).await?;
    println!("worker-selfcheck: bucket {} reachable", bucket);
    Ok(())
}
