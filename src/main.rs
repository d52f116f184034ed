//! # LuminoTune — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与结果输出。
//! 调整流水线逻辑位于 `adjustment` 模块，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use bytes::Bytes;
use clap::Parser;
use luminotune::adjustment::{
    AdjustmentController, AdjustmentParams, ComputationMode, Histogram, HistogramView,
    HttpRemoteSync, PipelineConfig, PixelBuffer, BINS,
};
use luminotune::error::AppError;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "luminotune")]
#[command(version, about = "Brightness/contrast adjustment with per-channel histograms", long_about = None)]
struct Cli {
    /// Input image file
    #[arg(value_name = "IMAGE")]
    input: PathBuf,

    /// Contrast gain (0.1 ..= 3.0)
    #[arg(short, long, value_name = "FLOAT", default_value = "1.0")]
    alpha: f32,

    /// Brightness offset (-100 ..= 100)
    #[arg(short, long, value_name = "INT", default_value = "0", allow_hyphen_values = true)]
    beta: i32,

    /// Fetch histograms from the image service instead of computing them locally
    #[arg(long)]
    remote: bool,

    /// Use the one-shot /api/process_image endpoint
    #[arg(long, conflicts_with = "remote")]
    oneshot: bool,

    /// Write the adjusted image as PNG
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write the rendered adjusted histogram (REMOTE mode)
    #[arg(long, value_name = "FILE")]
    histogram_output: Option<PathBuf>,

    /// Image service base URL (overrides LUMINOTUNE_BACKEND_URL)
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ {}", err);
            eprintln!("error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = match &cli.backend_url {
        Some(url) => PipelineConfig::with_backend_url(url.as_str()),
        None => PipelineConfig::from_env(),
    };
    let params = AdjustmentParams::new(cli.alpha, cli.beta)?;
    let file = Bytes::from(std::fs::read(&cli.input)?);
    let remote = HttpRemoteSync::new(config.clone())?;

    if cli.oneshot {
        let processed = remote.process_image(file, params).await?;
        write_output(cli.output.as_ref(), &processed.adjusted)?;

        let summary = json!({
            "mode": "oneshot",
            "params": params,
            "width": processed.original.width,
            "height": processed.original.height,
            "original_histogram": histogram_summary(&processed.original_histogram),
            "adjusted_histogram": histogram_summary(&processed.adjusted_histogram),
        });
        return print_summary(&summary, cli.json);
    }

    let mut controller = AdjustmentController::new(remote, config)?;
    if cli.remote {
        controller.toggle_mode()?;
    }
    controller.set_params(params)?;
    controller.load_image(file).await?;

    if controller.mode() == ComputationMode::Remote {
        controller.settle().await;
        if let Some(notice) = controller.take_notice() {
            log::warn!("⚠️ 远端直方图未更新：{}", notice);
        }
    }

    if let Some(adjusted) = controller.adjusted() {
        write_output(cli.output.as_ref(), adjusted)?;
    }

    let adjusted_view = controller.displayed_adjusted_histogram();
    if let (Some(path), Some(HistogramView::Rendered(rendered))) =
        (cli.histogram_output.as_ref(), adjusted_view)
    {
        std::fs::write(path, &rendered.png)?;
        log::info!("💾 直方图已写入 {}", path.display());
    }

    let (width, height) = controller
        .original()
        .map(|b| (b.width, b.height))
        .unwrap_or_default();
    let summary = json!({
        "mode": controller.mode().as_str(),
        "params": controller.params(),
        "width": width,
        "height": height,
        "original_histogram": view_summary(controller.displayed_original_histogram()),
        "adjusted_histogram": view_summary(adjusted_view),
    });
    print_summary(&summary, cli.json)
}

fn write_output(path: Option<&PathBuf>, buffer: &PixelBuffer) -> Result<(), AppError> {
    let Some(path) = path else {
        return Ok(());
    };
    std::fs::write(path, buffer.encode_png()?)?;
    log::info!("💾 调整结果已写入 {}", path.display());
    Ok(())
}

fn view_summary(view: Option<HistogramView<'_>>) -> Value {
    match view {
        Some(HistogramView::Computed(hist)) => histogram_summary(hist),
        Some(HistogramView::Rendered(rendered)) => json!({ "rendered_png_bytes": rendered.png.len() }),
        None => Value::Null,
    }
}

fn histogram_summary(hist: &Histogram) -> Value {
    let mean = |bins: &[u64]| {
        let total: u64 = bins.iter().sum();
        if total == 0 {
            return 0.0;
        }
        let weighted: u64 = bins.iter().enumerate().map(|(v, n)| v as u64 * n).sum();
        weighted as f64 / total as f64
    };

    json!({
        "bins": BINS,
        "peak": hist.peak(),
        "mean": {
            "red": mean(hist.red()),
            "green": mean(hist.green()),
            "blue": mean(hist.blue()),
        },
    })
}

fn print_summary(summary: &Value, as_json: bool) -> Result<(), AppError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("mode:     {}", summary["mode"].as_str().unwrap_or("-"));
    println!("size:     {}x{}", summary["width"], summary["height"]);
    println!("params:   {}", summary["params"]);
    for key in ["original_histogram", "adjusted_histogram"] {
        println!("{:<9} {}", format!("{}:", key.trim_end_matches("_histogram")), summary[key]);
    }
    Ok(())
}
