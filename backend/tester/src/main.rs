use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use reqwest::{
    Client, StatusCode,
    header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE},
};
use serde_json::{Value, json};
use server::{models::VoterRecord, session::SESSION_COOKIE, view::View};
use tokio::{signal::ctrl_c, time::sleep};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays a browser tab against the voter backend")]
struct Args {
    #[arg(long, env = "VOTER_URL", default_value = "http://127.0.0.1:1111")]
    url: String,

    /// Reuse a session id printed by an earlier run
    #[arg(long, env = "VOTER_SESSION")]
    session: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Status,

    Vote { choice: String },

    Name { name: String },

    ResetCounts,

    ResetAll,

    Voters,

    /// Poll the counts until Ctrl+C
    Watch {
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Vote from many fresh sessions at once and check nothing got lost
    Burst {
        #[arg(long, default_value = "50")]
        sessions: usize,
    },
}

struct Tab {
    client: Client,
    base: String,
}

impl Tab {
    fn new(base: &str, session: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(5));

        builder = match session {
            Some(id) => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    COOKIE,
                    HeaderValue::from_str(&format!("{SESSION_COOKIE}={id}"))
                        .context("Invalid session id")?,
                );
                builder.default_headers(headers)
            }
            None => builder.cookie_store(true),
        };

        Ok(Self {
            client: builder.build()?,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(StatusCode, View)> {
        let response = request.send().await.context("Backend unreachable")?;
        let status = response.status();

        if let Some(cookie) = response.headers().get(SET_COOKIE) {
            if let Some(id) = cookie
                .to_str()
                .ok()
                .and_then(|c| c.split(';').next())
                .and_then(|c| c.strip_prefix(&format!("{SESSION_COOKIE}=")))
            {
                info!("New session {id}, pass --session {id} to keep it");
            }
        }

        let view = response.json().await.context("Malformed view")?;
        debug!("{status}");

        Ok((status, view))
    }

    async fn state(&self) -> Result<(StatusCode, View)> {
        self.send(self.client.get(format!("{}/state", self.base)))
            .await
    }

    async fn post(&self, path: &str, body: Value) -> Result<(StatusCode, View)> {
        self.send(self.client.post(format!("{}{path}", self.base)).json(&body))
            .await
    }

    async fn voters(&self) -> Result<Vec<VoterRecord>> {
        let response = self
            .client
            .get(format!("{}/voters", self.base))
            .send()
            .await
            .context("Backend unreachable")?;

        if !response.status().is_success() {
            bail!("{}", response.text().await?);
        }

        Ok(response.json().await?)
    }
}

fn print_view(status: StatusCode, view: &View) {
    println!("{}", view.headline);
    println!("Yes: {} ({:.1}%)", view.counts.yes, view.counts.yes_pct);
    println!("No:  {} ({:.1}%)", view.counts.no, view.counts.no_pct);

    if let Some(name) = &view.session.name {
        println!("Name: {name}");
    }
    println!("{}", view.message);

    if let Some(warning) = &view.warning {
        println!("Warning ({status}): {warning}");
    }
}

async fn watch(tab: &Tab, interval_ms: Option<u64>) -> Result<()> {
    let mut last = None;

    loop {
        let interval = match tab.state().await {
            Ok((status, view)) => {
                let counts = (view.counts.yes, view.counts.no);
                if last != Some(counts) {
                    print_view(status, &view);
                    println!();
                    last = Some(counts);
                }

                interval_ms.unwrap_or(view.refresh_ms)
            }
            Err(e) => {
                warn!("Refresh failed: {e:#}");
                interval_ms.unwrap_or(2000)
            }
        };

        tokio::select! {
            _ = sleep(Duration::from_millis(interval)) => {},
            _ = ctrl_c() => return Ok(()),
        }
    }
}

async fn burst(base: &str, sessions: usize) -> Result<()> {
    let (_, before) = Tab::new(base, None)?.state().await?;

    let mut handles = Vec::with_capacity(sessions);
    for i in 0..sessions {
        let tab = Tab::new(base, None)?;
        let choice = if i % 2 == 0 { "yes" } else { "no" };

        handles.push(tokio::spawn(async move {
            tab.post("/vote", json!({ "choice": choice })).await
        }));
    }

    let mut recorded = 0;
    for handle in handles {
        match handle.await? {
            Ok((status, _)) if status.is_success() => recorded += 1,
            Ok((status, view)) => warn!("Vote refused ({status}): {:?}", view.warning),
            Err(e) => warn!("Vote failed: {e:#}"),
        }
    }

    let (_, after) = Tab::new(base, None)?.state().await?;
    let grown = after.counts.total.saturating_sub(before.counts.total);

    println!("Sessions: {sessions}, recorded: {recorded}, total grew by {grown}");

    if grown != recorded {
        bail!("Counts drifted: {recorded} votes recorded but total grew by {grown}");
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose)?;

    let tab = Tab::new(&args.url, args.session.as_deref())?;

    let (status, view) = match args.command {
        Command::Status => tab.state().await?,
        Command::Vote { choice } => tab.post("/vote", json!({ "choice": choice })).await?,
        Command::Name { name } => tab.post("/name", json!({ "name": name })).await?,
        Command::ResetCounts => tab.post("/reset/counts", json!({})).await?,
        Command::ResetAll => tab.post("/reset/all", json!({})).await?,
        Command::Voters => {
            for record in tab.voters().await? {
                println!("{:<24} {}", record.name, record.choice);
            }
            return Ok(());
        }
        Command::Watch { interval_ms } => return watch(&tab, interval_ms).await,
        Command::Burst { sessions } => return burst(&args.url, sessions).await,
    };

    print_view(status, &view);

    Ok(())
}
