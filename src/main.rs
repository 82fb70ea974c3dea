use std::error::Error;
use std::fs::File;

use log::{info, warn};
use simplelog::{
    ColorChoice, CombinedLogger, Config as LogConfig, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use student_records::api::query::{Order, SearchFilter};
use student_records::api::stats::DEFAULT_BINS;
use student_records::api::student::{format_date, format_score, ScoreLevel};
use student_records::api::AppState;

mod config;

use config::Config;

fn init_logger(config: &Config) -> Result<(), Box<dyn Error>> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        config.log_level,
        LogConfig::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(path) = &config.log_file {
        loggers.push(WriteLogger::new(
            config.log_level,
            LogConfig::default(),
            File::create(path)?,
        ));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env()?;
    init_logger(&config)?;

    let state = AppState::build(&config.database_path).await?;
    info!("opened {}", config.database_path.display());

    if state.db.is_empty().await? {
        // producer: background generation, consumer: this loop
        let (handle, mut rx) = state.spawn_populate(config.sample_size, config.generator_seed);
        while let Some(progress) = rx.recv().await {
            info!("{}", progress.message());
        }
        let outcome = handle.await??;
        if outcome.failed > 0 {
            warn!("{} generated students were not inserted", outcome.failed);
        }
    }

    let filter = SearchFilter::default();
    let view = state
        .load_page(&filter, Order::default(), 1, config.page_size)
        .await?;
    info!(
        "第{}/{}页, 共{}条",
        view.page, view.total_pages, view.total
    );
    for record in &view.records {
        info!(
            "{} {} {} {} {} {}({})",
            record.student_id,
            record.name,
            record.class_name,
            format_date(&record.enrollment_date),
            record.major,
            format_score(record.score),
            ScoreLevel::of(record.score)
        );
    }

    let dashboard = state.dashboard(&filter, DEFAULT_BINS).await?;
    for major in &dashboard.major_stats {
        info!(
            "{}: {}人, 平均{}",
            major.major,
            major.student_count,
            format_score(major.avg_score)
        );
    }
    for bin in &dashboard.histogram {
        info!("{}: {}", bin.label, bin.count);
    }

    if let Some(path) = &config.export_path {
        state.export_csv(path, &filter, Order::default()).await?;
    }

    state.db.close().await;
    Ok(())
}
