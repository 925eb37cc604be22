use std::path::PathBuf;
use std::time::Instant;
use chrono::NaiveDate;
use colored::Colorize;
use log::{error, info};
use crate::config;
use crate::config::AppConfig;
use crate::filter::{FilterState, Location};
use crate::layout::NodeKind;
use crate::pagination::PaginationController;
use crate::scrubber::{month_ticks, year_labels};
use crate::source::{demo_photos, HttpPageSource, InMemoryPageSource, PageSource};
use crate::state::FileStateStore;
use crate::timeline::{RenderFrame, Timeline, TimelineOptions};
use crate::utils::date_utils::parse_day;

const DEMO_DAYS: usize = 400;

#[derive(Debug, Default)]
pub struct BrowseArgs {
    pub date: Option<String>,
    pub query: Option<String>,
    pub scroll: Option<f64>,
}

pub async fn print_summary(config: AppConfig) {
    let result = if config.demo {
        fetch_summary(demo_source(&config), &config).await
    } else {
        fetch_summary(HttpPageSource::new(&config.api.api_url), &config).await
    };
    if let Err(e) = result {
        error!("Failed to load timeline summary: {}", e);
        std::process::exit(1);
    }
}

async fn fetch_summary<S: PageSource>(source: S, config: &AppConfig) -> Result<(), crate::error::GalleryError> {
    let mut pagination = PaginationController::new(config.paging.page_size, FilterState::default());
    pagination.reset_to(&source, 0).await?;
    let ticks = month_ticks(pagination.summary());
    for label in year_labels(&ticks) {
        println!("{}", label.year.to_string().bold());
        for tick in &ticks[label.first_tick..label.first_tick + label.count] {
            let bar = "#".repeat((tick.bar_width as usize / 10).max(1));
            println!("  {:02}  {:>7}  {}", tick.month, tick.total, bar.cyan());
        }
    }
    println!("{} {}", "Total:".bold(), pagination.summary().total());
    Ok(())
}

pub async fn browse(config: AppConfig, args: BrowseArgs) {
    let mut location = Location::default();
    if let Some(query) = &args.query {
        location.filter.apply_search_input(query);
    }
    if let Some(date) = &args.date {
        match parse_day(date) {
            Some(date) => location.date = Some(date),
            None => {
                eprintln!("Invalid date: {}", date);
                std::process::exit(1);
            }
        }
    }

    let result = if config.demo {
        run_browse(demo_source(&config), &config, location, args.scroll).await
    } else {
        run_browse(HttpPageSource::new(&config.api.api_url), &config, location, args.scroll).await
    };
    if let Err(e) = result {
        error!("Browse failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_browse<S: PageSource>(source: S, config: &AppConfig, location: Location, scroll: Option<f64>) -> Result<(), crate::error::GalleryError> {
    let options = TimelineOptions {
        page_size: config.paging.page_size,
        viewport_width: config.grid.viewport_width,
        viewport_height: config.grid.viewport_height,
        persist_debounce: config.state.debounce,
        prefetch: config.paging.prefetch,
        ..Default::default()
    };
    let store = FileStateStore::new(config.state.state_path());
    let mut timeline = Timeline::new(source, store, options);
    timeline.init(location).await?;
    if let Some(outcome) = timeline.prefetch().await {
        info!("prefetch: {:?}", outcome);
    }

    let mut frame = timeline.render();
    if let Some(top) = frame.scroll_to {
        timeline.confirm_scroll(top);
    }
    if let Some(scroll) = scroll {
        let now = Instant::now();
        let target = frame.scroll_to.unwrap_or(0.0) + scroll;
        for event in timeline.on_scroll(target, now).await {
            info!("{:?}", event);
        }
        frame = timeline.render();
        if let Some(top) = frame.scroll_to {
            timeline.confirm_scroll(top);
        }
        if let Some(date) = timeline.flush_persistence(now + config.state.debounce).await? {
            info!("saved visible date {}", date);
        }
    }

    print_frame(&frame, timeline.visible_date());
    println!("{} ?{}", "Location:".bold(), timeline.location_query());
    Ok(())
}

fn print_frame(frame: &RenderFrame, visible_date: Option<NaiveDate>) {
    if let Some(error) = &frame.error {
        println!("{} {}", "Error:".red().bold(), error);
    }
    for node in &frame.nodes {
        match &node.kind {
            NodeKind::DateHeader => println!("{:>8.0}  {}", node.top, node.date.format("%A, %B %-d, %Y").to_string().bold()),
            NodeKind::PhotoRow { items, row_height } => {
                let ids = items.iter().map(|x| format!("{}({:.0})", x.id, x.width)).collect::<Vec<_>>().join(" ");
                println!("{:>8.0}  {} {}", node.top, format!("h={:.0}", row_height).dimmed(), ids);
            }
        }
    }
    println!("{} {:.0}px, nodes {}..{}", "Height:".bold(), frame.total_height, frame.range.start, frame.range.end);
    if let Some(date) = visible_date {
        println!("{} {}", "Visible:".bold(), date);
    }
}

fn demo_source(config: &AppConfig) -> InMemoryPageSource {
    let newest = chrono::Utc::now().date_naive();
    InMemoryPageSource::new(demo_photos(newest, DEMO_DAYS), config.paging.page_size)
}

pub fn get_config_value(config: AppConfig, key: &str) {
    match key {
        "work-dir" => {
            println!("Workdir: {:?}", config.state.work_dir);
            std::process::exit(0);
        },
        "api-url" => {
            println!("API URL: {}", config.api.api_url);
            std::process::exit(0);
        },
        "page-size" => {
            println!("Page size: {}", config.paging.page_size);
            std::process::exit(0);
        },
        "log-level" => {
            println!("Log level: {}", config.log_level);
            std::process::exit(0);
        },
        _ => {
            eprintln!("Invalid key: {}", key);
            std::process::exit(1);
        }
    }
}

pub fn set_config_value(mut config: AppConfig, key: &str, value: &str) {
    match key {
        "work-dir" => {
            let path = PathBuf::from(value);
            if !path.exists() {
                eprintln!("Path does not exist: {:?}", path);
                std::process::exit(1);
            }
            config.file_config.workdir = Some(path.display().to_string());
        },
        "api-url" => {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                eprintln!("Invalid URL: {}", value);
                std::process::exit(1);
            }
            config.file_config.api_url = Some(value.trim_end_matches('/').to_string());
        },
        "page-size" => {
            match value.parse::<usize>() {
                Ok(size) if size > 0 => config.file_config.page_size = Some(size),
                _ => {
                    eprintln!("Invalid page size: {}", value);
                    std::process::exit(1);
                }
            }
        },
        "log-level" => {
            config.file_config.log_level = Some(value.to_string());
        },
        _ => {
            eprintln!("Invalid key: {}", key);
            std::process::exit(1);
        }
    }
    if let Err(e) = config::write_file_config(&config.config_path, &config.file_config) {
        eprintln!("Failed to write config: {:#}", e);
        std::process::exit(1);
    }
    println!("{} set to: {:?}", key, value);
    std::process::exit(0);
}
