use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use scanner_lib::command::execute_json_batch;
use scanner_lib::engine::{replay_source_from_env, ReconstructionEngine, ReplayEngine, UnsupportedEngine};
use scanner_lib::events::for_each_event;
use scanner_lib::settings::ScannerSettings;
use scanner_lib::transfer::HttpTransport;
use scanner_lib::Scanner;
use shared::ExportFormat;

/// Replay or capture a scan, export it and optionally upload the result
#[derive(Debug, Parser)]
#[command(name = "scanner", version, about, long_about = None)]
struct Cli {
    /// Text-mesh (.obj) or JSON scene to replay instead of a live sensor
    #[arg(long, value_name = "FILE")]
    scene: Option<PathBuf>,

    /// Export format (archive|glb, obj, stl); repeat for several
    #[arg(long = "format", value_name = "NAME")]
    formats: Vec<ExportFormat>,

    /// Directory exports are written to
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Upload the last export to this http(s) URL
    #[arg(long, value_name = "URL")]
    upload: Option<String>,

    /// Run a JSON array of commands instead of the default flow
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanner=info,scanner_lib=info".into()),
        )
        .init();

    let args = Cli::parse();

    let mut settings = ScannerSettings::load();
    if let Some(out) = &args.out {
        settings.export_dir = out.clone();
    }

    let engine: Arc<dyn ReconstructionEngine> = match args.scene.clone().or_else(replay_source_from_env) {
        Some(path) => Arc::new(ReplayEngine::from_path(&path)?),
        None => {
            tracing::warn!("No --scene given and no sensor attached; scanning is unavailable");
            Arc::new(UnsupportedEngine)
        }
    };
    let transport = Arc::new(HttpTransport::new(&settings.upload)?);
    let scanner = Scanner::new(engine, transport, settings);

    tokio::spawn(for_each_event(scanner.subscribe(), |event| {
        tracing::info!("event: {}", serde_json::to_string(&event).unwrap_or_default());
    }));

    if let Some(script) = &args.script {
        let json = std::fs::read_to_string(script)
            .with_context(|| format!("reading {}", script.display()))?;
        let responses = execute_json_batch(&scanner, &json)
            .await
            .map_err(anyhow::Error::msg)?;
        println!("{}", serde_json::to_string_pretty(&responses)?);
        return Ok(());
    }

    scanner.start_scan().await?;
    let scene = scanner.stop_scan().await?;
    let summary = scene.summary();
    println!(
        "Captured {} nodes, {} vertices, {} triangles",
        summary.node_count, summary.vertex_count, summary.triangle_count
    );

    let formats = if args.formats.is_empty() {
        vec![ExportFormat::FacetFormat]
    } else {
        args.formats.clone()
    };
    for format in formats {
        let artifact = scanner.export(format).await?;
        println!("{format}: {} ({} bytes)", artifact.path.display(), artifact.byte_len);
    }

    if let Some(destination) = &args.upload {
        let receipt = scanner.upload_latest(destination).await?;
        println!("{}", receipt.message);
    }

    Ok(())
}
