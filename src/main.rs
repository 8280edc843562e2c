//! GPS Fixer - Geotag photos from a GPS logger track
//!
//! A CLI tool that matches each photo's capture time against a GPS track
//! and writes the nearest coordinates into the photo's EXIF data.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use gps_fixer::log::{BatchResult, Marker};
use gps_fixer::{Cli, Config, spawn_batch};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target used for batch log lines; they are echoed to stdout already
const BATCH_TARGET: &str = "gps_fixer::batch";

/// How often the worker's log is polled
const POLL_INTERVAL: Duration = Duration::from_millis(50);

// CLI Output Module
mod cli_output {
    //! CLI 输出美化模块
    //!
    //! 为命令行输出提供统一的颜色和格式样式。

    use crossterm::{
        ExecutableCommand,
        style::{Color, Print, Stylize, style},
    };
    use gps_fixer::log::Marker;
    use std::io::stdout;

    /// CLI 主题颜色
    pub struct CliTheme;

    impl CliTheme {
        /// 成功颜色（绿色）
        pub const SUCCESS: Color = Color::Green;
        /// 警告颜色（黄色）
        pub const WARNING: Color = Color::Yellow;
        /// 错误颜色（红色）
        pub const ERROR: Color = Color::Red;
        /// 提示颜色（暗灰色）
        pub const HINT: Color = Color::DarkGrey;
        /// 强调颜色（青色）
        pub const ACCENT: Color = Color::Cyan;
    }

    /// 打印分隔线
    pub fn print_separator() {
        let _ = stdout().execute(Print(&format!("{}\n", "─".repeat(60))));
    }

    /// 打印居中的标题
    pub fn print_title(title: &str) {
        let width = 60;
        let padding = (width - title.len()) / 2;
        let left_pad = " ".repeat(padding.saturating_sub(1));

        let _ = stdout().execute(Print(&format!(
            "{}{} {}{}\n",
            left_pad,
            "╔".bold().stylize(),
            title.bold().stylize(),
            "╗".bold().stylize(),
        )));
        let _ = stdout().execute(Print("\n"));
    }

    /// 打印警告消息
    pub fn print_warning(msg: &str) {
        let _ = stdout().execute(Print(style("⚠ ").with(CliTheme::WARNING).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    /// 打印统计项
    pub fn print_stat(key: &str, value: &str, color: Color) {
        let key_styled = style(key).with(CliTheme::HINT);
        let value_styled = style(value).with(color).bold();
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(key_styled));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(value_styled));
        let _ = stdout().execute(Print("\n"));
    }

    /// 打印批处理日志行，按标记着色
    pub fn print_line(line: &str) {
        let color = match Marker::of_line(line) {
            Some(Marker::Error) | Some(Marker::Failure) => CliTheme::ERROR,
            Some(Marker::Success) => CliTheme::SUCCESS,
            Some(Marker::Info) => CliTheme::ACCENT,
            Some(Marker::Progress) | None => Color::Reset,
        };
        let _ = stdout().execute(Print(style(format!("{}\n", line)).with(color)));
    }

    /// 打印文件路径
    pub fn print_path(label: &str, path: &str) {
        let _ = stdout().execute(Print(style(format!("  {}: ", label)).with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", path)));
    }

    /// 打印空行
    pub fn print_blank() {
        let _ = stdout().execute(Print("\n"));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_sample_config {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let exe_dir = get_executable_dir()?;
    let config = load_config(&cli, &exe_dir)?;

    let log_path = get_log_path(&exe_dir, &cli, &config);
    let _guard = setup_logging(&cli, &log_path)?;

    info!(version = env!("CARGO_PKG_VERSION"), "GPS Fixer starting");
    if config.verbose {
        info!(?config, "Configuration loaded");
    }
    info!(log_file = %log_path.display(), "Log file location");

    validate_config(&config)?;

    let dry_run = config.dry_run;
    let result = run_batch(config)?;
    print_summary(&result, dry_run);

    if let Some(ref report) = cli.report {
        write_report(report, &result)?;
        cli_output::print_path("Report", &report.display().to_string());
    }
    cli_output::print_path("Log file", &log_path.display().to_string());

    info!(summary = %result.summary(), "Processing complete");
    Ok(())
}

/// Run the batch on a worker thread, echoing its log as lines arrive
fn run_batch(config: Config) -> Result<BatchResult> {
    let handle = spawn_batch(config)?;
    let log = handle.log.clone();
    let mut printed = 0;

    loop {
        let finished = handle.is_finished();
        for line in log.lines_since(printed) {
            cli_output::print_line(&line);
            printed += 1;
        }
        if finished {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let result = handle.join();
    for line in result.lines.iter().skip(printed) {
        cli_output::print_line(line);
    }
    Ok(result)
}

fn print_summary(result: &BatchResult, dry_run: bool) {
    use cli_output::*;

    print_blank();
    print_separator();
    print_title("Geotagging Complete");
    print_separator();

    let errors = result
        .lines
        .iter()
        .filter(|l| Marker::of_line(l) == Some(Marker::Error))
        .count();

    print_stat("Considered", &result.considered.to_string(), CliTheme::ACCENT);
    print_stat("Succeeded", &result.succeeded.to_string(), CliTheme::SUCCESS);
    print_stat("Skipped", &result.skipped.to_string(), CliTheme::WARNING);
    print_stat("Failed", &result.failed.to_string(), CliTheme::ERROR);
    print_stat("Errors logged", &errors.to_string(), CliTheme::ERROR);
    print_blank();

    if dry_run {
        print_separator();
        print_warning("Dry run: no photo was modified");
    }
    print_separator();
}

/// Write the batch result as pretty JSON
fn write_report(path: &Path, result: &BatchResult) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), result)?;
    Ok(())
}

/// Get the directory where the executable is located
fn get_executable_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe()?;
    Ok(exe_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Determine the log file path based on config file or timestamp
fn get_log_path(exe_dir: &Path, cli: &Cli, config: &Config) -> PathBuf {
    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| exe_dir.join("Log"));
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");

    if let Some(config_name) = cli.config_name() {
        let log_filename = format!("{}_{}.log", config_name, timestamp);
        log_dir.join(&config_name).join(log_filename)
    } else {
        log_dir.join(format!("CLIRun_{}.log", timestamp))
    }
}

/// Resolve config path - supports shorthand syntax
fn resolve_config_path(exe_dir: &Path, config_path: &Path) -> PathBuf {
    if config_path.exists() {
        return config_path.to_path_buf();
    }

    let with_extension = if config_path.extension().is_none() {
        config_path.with_extension("toml")
    } else {
        config_path.to_path_buf()
    };

    if with_extension.exists() {
        return with_extension;
    }

    let config_dir = exe_dir.join("Config");
    let filename = config_path.file_name().unwrap_or(config_path.as_os_str());

    let mut in_config_dir = config_dir.join(filename);
    if in_config_dir.extension().is_none() {
        in_config_dir = in_config_dir.with_extension("toml");
    }

    if in_config_dir.exists() {
        return in_config_dir;
    }

    config_path.to_path_buf()
}

/// Load configuration from file or CLI arguments
fn load_config(cli: &Cli, exe_dir: &Path) -> Result<Config> {
    let config = if let Some(ref config_path) = cli.config {
        let resolved_path = resolve_config_path(exe_dir, config_path);
        let file_config = Config::load_from_file(&resolved_path)?;
        cli.merge_with_config(file_config)
    } else {
        cli.to_config()
    };

    if config.track_file.as_os_str().is_empty() {
        anyhow::bail!("No GPS track given. Use --track or set track_file in the config file");
    }
    if config.photo_dir.as_os_str().is_empty() {
        anyhow::bail!("No photo directory given. Use --photos or set photo_dir in the config file");
    }

    Ok(config)
}

/// Setup logging for CLI mode (file + console)
fn setup_logging(cli: &Cli, log_path: &Path) -> Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter_fn(|meta| meta.target() != BATCH_TARGET));
    let subscriber = tracing_subscriber::registry().with(env_filter).with(console);

    if cli.json_log {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .init();
    }

    Ok(Some(guard))
}

/// Validate configuration before processing
fn validate_config(config: &Config) -> Result<()> {
    if !config.track_file.is_file() {
        anyhow::bail!("GPS track file does not exist: {}", config.track_file.display());
    }

    if !config.photo_dir.is_dir() {
        anyhow::bail!("Photo directory does not exist: {}", config.photo_dir.display());
    }

    if config.extensions.is_empty() {
        anyhow::bail!("No photo extensions configured");
    }

    Ok(())
}
