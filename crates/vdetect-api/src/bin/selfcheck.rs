use std::process::Command;

use vdetect_api::{ApiConfig, AppState};
use vdetect_engine::ModelSettings;
use vdetect_media::SamplerConfig;
use vdetect_models::StepStatus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("selfcheck: rustls crypto provider was already installed");
    }

    let config = ApiConfig::from_env();
    let settings = ModelSettings::from_env();
    let sampler = SamplerConfig::from_env();

    println!(
        "selfcheck: model={} cache_dir={} work_dir={}",
        settings.repo_id,
        settings.cache_dir.display(),
        config.work_dir.display()
    );

    tokio::fs::create_dir_all(&config.work_dir).await?;
    ensure_tool("ffmpeg")?;
    ensure_tool("ffprobe")?;

    let state = AppState::new(config, settings, sampler);
    let report = state
        .diagnostics
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    for step in &report.steps {
        let mark = match step.status {
            StepStatus::Success => "ok",
            StepStatus::Error => "FAILED",
            StepStatus::Running => "running",
            StepStatus::Pending => "skipped",
        };
        println!(
            "selfcheck: [{}/{}] {:<18} {:<8} {}",
            step.id.number(),
            report.total_steps,
            step.title,
            mark,
            step.detail.as_deref().unwrap_or("")
        );
    }

    if !report.test_passed {
        return Err(anyhow::anyhow!(
            "diagnostics failed at {}",
            report
                .failed_step
                .map(|s| s.as_str())
                .unwrap_or("unknown step")
        ));
    }

    println!("selfcheck: ok");
    Ok(())
}

fn ensure_tool(name: &str) -> anyhow::Result<()> {
    let output = Command::new(name)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("{} -version failed: {:?}", name, output.status));
    }
    Ok(())
}
