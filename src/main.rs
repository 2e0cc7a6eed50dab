use anyhow::{anyhow, Result};
use tracing::{info, warn};

use note_scout::browser::cdp::CdpDriver;
use note_scout::browser::launcher::{wait_until_ready, BrowserSession};
use note_scout::core::{load_scout_config, BrowserSettings, HarvestSettings};
use note_scout::{content_id_from_url, report, BrowserDriver, HarvestResult, Harvester};

const USAGE: &str = "usage: note-scout <note-url> [--content-id ID] [--scroll N | --no-scroll] [--json] [--headless]";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    url: String,
    content_id: Option<String>,
    scroll_count: Option<u32>,
    no_scroll: bool,
    json: bool,
    headless: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut url = None;
    let mut args = args.into_iter();
    while let Some(a) = args.next() {
        match a.as_str() {
            "--content-id" => {
                out.content_id = Some(args.next().ok_or_else(|| anyhow!("--content-id needs a value"))?);
            }
            "--scroll" => {
                let v = args.next().ok_or_else(|| anyhow!("--scroll needs a value"))?;
                out.scroll_count = Some(v.parse().map_err(|_| anyhow!("invalid --scroll value: {}", v))?);
            }
            "--no-scroll" => out.no_scroll = true,
            "--json" => out.json = true,
            "--headless" => out.headless = true,
            other => {
                if let Some(v) = other.strip_prefix("--content-id=") {
                    out.content_id = Some(v.to_string());
                } else if let Some(v) = other.strip_prefix("--scroll=") {
                    out.scroll_count = Some(v.parse().map_err(|_| anyhow!("invalid --scroll value: {}", v))?);
                } else if other.starts_with("--") {
                    anyhow::bail!("unknown option {}\n{}", other, USAGE);
                } else if url.is_none() {
                    url = Some(other.to_string());
                } else {
                    anyhow::bail!("unexpected argument {}\n{}", other, USAGE);
                }
            }
        }
    }
    out.url = url.ok_or_else(|| anyhow!("{}", USAGE))?;
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let config = load_scout_config();
    let mut browser_settings = config.browser.resolve();
    if args.headless {
        browser_settings.headless = true;
    }
    let harvest_settings = config.harvest.resolve();

    let session = BrowserSession::launch(&browser_settings).await?;
    let outcome = harvest_note(&session, &browser_settings, harvest_settings, &args).await;
    session.close().await;
    let result = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        info!("\n{}", report::format_comments(&result.comments));
        info!("{}", report::format_summary(&result));
    }
    Ok(())
}

async fn harvest_note(
    session: &BrowserSession,
    browser_settings: &BrowserSettings,
    harvest_settings: HarvestSettings,
    args: &CliArgs,
) -> Result<HarvestResult> {
    let page = session.blank_page().await?;
    let driver = CdpDriver::attach(page, browser_settings.scroll_measure_delay).await?;

    info!("🌐 Opening note: {}", args.url);
    driver
        .page()
        .goto(args.url.as_str())
        .await
        .map_err(|e| anyhow!("Failed to navigate: {}", e))?;
    let wait_ms = browser_settings.page_load_wait.as_millis() as u64;
    wait_until_ready(driver.page(), wait_ms.min(1500), wait_ms.max(1500) + 5000).await;

    let content_id = match args.content_id.clone() {
        Some(id) => Some(id),
        None => {
            let current = driver.current_page_url().await.unwrap_or_else(|e| {
                warn!("Could not read the current URL: {}", e);
                args.url.clone()
            });
            let id = content_id_from_url(&current).or_else(|| content_id_from_url(&args.url));
            match id.as_deref() {
                Some(id) => info!("Note id from URL: {}", id),
                None => warn!("No note id in URL; accepting comment pages of any note"),
            }
            id
        }
    };

    let scroll_count = args.scroll_count.unwrap_or(harvest_settings.scroll_count);
    let harvester = Harvester::new(&driver, harvest_settings);
    let result = if args.no_scroll {
        harvester.harvest_initial(content_id.as_deref()).await
    } else {
        harvester
            .harvest_with_scroll(content_id.as_deref(), scroll_count)
            .await
    };
    Ok(result)
}
