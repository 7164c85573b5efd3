use crate::{
    format_bytes, format_duration, CaptureError, CaptureReport, CaptureRequest, CaptureService,
    Config, ErrorCategory, ImageFormat, PrometheusExporter, WaitStrategy,
};
use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use tracing::{info, warn};

pub const USAGE_EXAMPLE: &str = "Example: capture http://google.com google 1200 800";

#[derive(Parser, Debug)]
#[command(name = "capture")]
#[command(about = "Screenshot a web page once its network activity settles")]
#[command(version)]
#[command(after_help = USAGE_EXAMPLE)]
pub struct Cli {
    #[arg(help = "URL of the page to capture")]
    pub url: String,

    #[arg(help = "Output path without extension (.png and .html are appended)")]
    pub output_base: PathBuf,

    #[arg(help = "Viewport width [default: 1280]")]
    pub width: Option<u32>,

    #[arg(help = "Viewport height [default: 800]")]
    pub height: Option<u32>,

    #[arg(long, value_name = "MS", help = "Quiet period after the last response before capturing")]
    pub quiet_period: Option<u64>,

    #[arg(long, value_name = "MS", help = "Maximum wait from navigation start")]
    pub max_wait: Option<u64>,

    #[arg(long, value_name = "SECS", help = "Hard limit for the whole capture")]
    pub timeout: Option<u64>,

    #[arg(long, value_enum, help = "How to decide the page is ready")]
    pub wait_strategy: Option<WaitStrategy>,

    #[arg(long, value_enum, help = "Image format")]
    pub format: Option<ImageFormat>,

    #[arg(long, help = "Capture only the viewport instead of the full page")]
    pub viewport_only: bool,

    #[arg(long, help = "Also write the page's visible text to <output-base>.txt")]
    pub scrape_text: bool,

    #[arg(long, help = "User-Agent override")]
    pub user_agent: Option<String>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Print the capture report as JSON on stdout")]
    pub json: bool,

    #[arg(long, value_name = "PATH", help = "Write Prometheus metrics for this run to a file")]
    pub metrics_file: Option<PathBuf>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

impl Cli {
    /// Layer command-line overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(width) = self.width {
            config.viewport.width = width;
        }
        if let Some(height) = self.height {
            config.viewport.height = height;
        }
        if let Some(quiet_period) = self.quiet_period {
            config.settle.ajax_quiet_period_ms = quiet_period;
        }
        if let Some(max_wait) = self.max_wait {
            config.settle.max_wait_ms = max_wait;
        }
        if let Some(timeout) = self.timeout {
            config.capture_timeout_secs = timeout;
        }
        if let Some(strategy) = self.wait_strategy {
            config.settle.strategy = strategy;
        }
        if let Some(format) = self.format {
            config.image_format = format;
        }
        if self.viewport_only {
            config.full_page = false;
        }
        if self.scrape_text {
            config.scrape_text = true;
        }
        if let Some(user_agent) = &self.user_agent {
            config.user_agent = Some(user_agent.clone());
        }
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
    }

    pub fn request(&self) -> CaptureRequest {
        CaptureRequest::new(self.url.clone(), self.output_base.clone())
    }
}

/// Exit status and message for a command line clap rejected.
///
/// Help exits 1 like any other usage failure; only `--version` is a success.
pub fn usage_exit(err: &clap::Error) -> (i32, String) {
    let message = err.to_string();
    match err.kind() {
        ErrorKind::DisplayVersion => (0, message),
        ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            (1, message)
        }
        _ => (1, format!("{}\n{}", message.trim_end(), USAGE_EXAMPLE)),
    }
}

/// Exit status and stderr message for a run that failed after parsing.
///
/// Usage and configuration errors repeat the invocation example.
pub fn failure_exit(err: &anyhow::Error) -> (i32, String) {
    let message = format!("{err:#}");
    let is_usage = err
        .downcast_ref::<CaptureError>()
        .map_or(false, |e| e.category() == ErrorCategory::Usage);

    if is_usage {
        (1, format!("{message}\n{USAGE_EXAMPLE}"))
    } else {
        (1, message)
    }
}

/// Run `work` unless `shutdown` resolves first.
pub async fn until_shutdown<T, W, S>(work: W, shutdown: S) -> Result<T, CaptureError>
where
    W: Future<Output = Result<T, CaptureError>>,
    S: Future<Output = &'static str>,
{
    tokio::select! {
        result = work => result,
        signal = shutdown => {
            warn!("Received {}, abandoning capture", signal);
            Err(CaptureError::Interrupted(signal.to_string()))
        }
    }
}

pub async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    args.apply_overrides(&mut config);
    config.validate()?;

    info!(
        "Viewport {}x{}, quiet period {}ms, max wait {}ms, strategy {:?}",
        config.viewport.width,
        config.viewport.height,
        config.settle.ajax_quiet_period_ms,
        config.settle.max_wait_ms,
        config.settle.strategy
    );

    Ok(config)
}

pub struct CliRunner {
    pub config: Config,
    request: CaptureRequest,
    json: bool,
    metrics_file: Option<PathBuf>,
}

impl CliRunner {
    pub fn new(config: Config, args: &Cli) -> anyhow::Result<Self> {
        let request = args.request();
        request.validate()?;

        Ok(Self {
            config,
            request,
            json: args.json,
            metrics_file: args.metrics_file.clone(),
        })
    }

    /// Capture the requested page. A resolved `shutdown` abandons the capture,
    /// but the browser is still shut down and its profile removed.
    pub async fn run<S>(&self, shutdown: S) -> anyhow::Result<()>
    where
        S: Future<Output = &'static str>,
    {
        // The recorder must exist before the service registers its metrics
        let exporter = match &self.metrics_file {
            Some(_) => Some(PrometheusExporter::install()?),
            None => None,
        };

        let service = CaptureService::new(self.config.clone())
            .await
            .context("Failed to start headless browser")?;
        let result = until_shutdown(service.capture(self.request.clone()), shutdown).await;
        service.shutdown().await;

        if let (Some(exporter), Some(path)) = (&exporter, &self.metrics_file) {
            exporter.write_to(path).await?;
        }

        let report = result?;
        self.print_report(&report)?;
        Ok(())
    }

    fn print_report(&self, report: &CaptureReport) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        info!("Capture of {} complete", report.url);
        println!("Captured {}", report.url);
        println!(
            "  Image: {} ({})",
            report.files.image.display(),
            format_bytes(report.image_bytes)
        );
        println!(
            "  HTML: {} ({})",
            report.files.html.display(),
            format_bytes(report.html_bytes)
        );
        if let Some(text) = &report.files.text {
            println!("  Text: {}", text.display());
        }
        if let Some(status) = report.stats.status_code {
            println!("  Status: {status} HTTP STATUS CODE");
        }
        println!(
            "  Ready: {} after {} ({} requests)",
            report.stats.trigger.as_str(),
            format_duration(report.stats.waited),
            report.stats.settle.requests_observed
        );
        println!("  Total: {}", format_duration(report.elapsed));

        Ok(())
    }
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()?;

    Ok(())
}
