use chrono::{Duration, FixedOffset};
use clap::Parser;
use color_eyre::eyre::OptionExt;
use wordschool::{db::Db, names, services::study::StudyConfig, AppState};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// SQLite database URL, e.g. sqlite://data/wordschool.db
    #[clap(env)]
    database_url: String,

    /// The address to bind to.
    #[arg(short, long, env, default_value = "127.0.0.1:1414")]
    address: String,

    /// Number of items frozen into a final test.
    #[arg(long, env, default_value_t = names::DEFAULT_FINAL_TEST_ITEM_COUNT)]
    final_test_item_count: usize,

    /// Offset from UTC, in minutes, of the day scores are rolled up under.
    #[arg(long, env, default_value_t = names::DEFAULT_REPORT_UTC_OFFSET_MINUTES, allow_negative_numbers = true)]
    report_utc_offset_minutes: i32,

    /// Seconds after a completion during which a repeated completion is a retry.
    #[arg(long, env, default_value_t = names::DEFAULT_DUPLICATE_COMPLETION_WINDOW_SECS)]
    duplicate_completion_window_secs: i64,
}

impl Args {
    fn study_config(&self) -> color_eyre::Result<StudyConfig> {
        let report_offset = FixedOffset::east_opt(self.report_utc_offset_minutes * 60)
            .ok_or_eyre("report offset must be within a day of UTC")?;

        Ok(StudyConfig {
            final_test_item_count: self.final_test_item_count,
            report_offset,
            duplicate_window: Duration::seconds(self.duplicate_completion_window_secs),
        })
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tower_http=info,wordschool=debug".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let args = Args::parse();
    let config = args.study_config()?;

    let db = Db::new(&args.database_url).await?;
    let app = wordschool::router(AppState::new(db, config));

    let address = args.address.parse::<std::net::SocketAddr>()?;
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!("listening on {address}");
    axum::serve(listener, app).await?;

    Ok(())
}
