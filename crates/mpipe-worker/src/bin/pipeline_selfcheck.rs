use std::path::Path;

use mpipe_media::command::{check_ffmpeg, check_ffprobe};
use mpipe_storage::{GcsPublisher, PublisherKind, S3Client};
use mpipe_worker::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env();

    println!(
        "pipeline-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;

    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    let ffprobe = check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    println!("pipeline-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    let kind: PublisherKind = std::env::var("PUBLISHER").unwrap_or_default().parse()?;
    if matches!(kind, PublisherKind::S3 | PublisherKind::Gcs) {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;
    }
    match kind {
        PublisherKind::S3 => {
            ensure_env_present(&["S3_ENDPOINT_URL", "S3_ACCESS_KEY", "S3_SECRET_KEY", "S3_BUCKET_NAME"])?;
            S3Client::from_env()?.check_connectivity().await?;
        }
        PublisherKind::Gcs => {
            ensure_env_present(&["GCP_BUCKET_NAME"])?;
            GcsPublisher::from_env()?.check_credentials().await?;
        }
        PublisherKind::Local => ensure_env_present(&["LOCAL_PUBLISH_DIR"])?,
        PublisherKind::None => {}
    }

    println!("pipeline-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
