use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::downstream::{CiServer, CiServers, HttpCiServer};
use crate::events::EventBuilder;
use crate::hooks::Notification;
use crate::providers::gitlab::{GitLabApi, GitLabClient};
use crate::relay::EventRelay;
use crate::server;

#[derive(Parser)]
#[command(name = "cirelay")]
#[command(author, version, about = "GitLab webhook to CI event relay", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./cirelay.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, env = "GITLAB_TOKEN")]
    token: Option<String>,

    #[arg(short, long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook listener
    Serve {
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Print how a stored webhook payload would be normalized, without
    /// publishing anything
    Classify {
        payload: PathBuf,

        #[arg(short, long, default_value_t = false)]
        pretty: bool,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(token) = &self.token {
            config.gitlab.token = Some(token.clone());
        }
        if let Some(url) = &self.url {
            config.gitlab.base_url = url.clone();
        }
        Ok(config)
    }

    fn gitlab(config: &Config) -> Result<Arc<dyn GitLabApi>> {
        let client = GitLabClient::new(&config.gitlab.base_url, config.gitlab.token.clone())
            .context("Failed to create the GitLab client")?;
        Ok(Arc::new(client))
    }

    async fn execute_serve(&self, bind: Option<&str>) -> Result<()> {
        let config = self.load_config()?;

        let servers = config
            .ci_servers
            .iter()
            .map(|server| {
                HttpCiServer::new(server)
                    .map(|server| Arc::new(server) as Arc<dyn CiServer>)
                    .with_context(|| format!("Invalid CI server {}", server.name))
            })
            .collect::<Result<Vec<_>>>()?;
        if servers.is_empty() {
            warn!("No CI servers configured, events will not be delivered anywhere");
        }
        let servers = CiServers::new(servers);
        info!("Relaying GitLab events to: {}", servers.names().join(", "));

        let relay = EventRelay::new(Self::gitlab(&config)?, servers, &config);
        let bind = bind.unwrap_or(&config.server.bind);
        server::serve(Arc::new(relay), bind).await
    }

    async fn execute_classify(&self, payload: &PathBuf, pretty: bool) -> Result<()> {
        let config = self.load_config()?;

        let contents = std::fs::read_to_string(payload)
            .with_context(|| format!("Failed to read payload: {}", payload.display()))?;
        let raw: Value = serde_json::from_str(&contents)
            .with_context(|| format!("Payload is not JSON: {}", payload.display()))?;
        let notification = Notification::parse(raw)?;

        let builder = EventBuilder::new(Self::gitlab(&config)?, config.job_ci_id_prefix.clone());
        let identity = builder.identify(&notification).await;
        let event = match &notification {
            Notification::MergeRequest(_) => None,
            _ => Some(builder.build(&notification, &identity, Vec::new())?),
        };

        let summary = json!({
            "kind": format!("{:?}", notification.kind()),
            "eventType": notification.event_type(),
            "pipelineId": notification.pipeline_id(),
            "event": event,
        });

        let output = if pretty {
            serde_json::to_string_pretty(&summary)?
        } else {
            serde_json::to_string(&summary)?
        };
        println!("{output}");

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Serve { bind } => self.execute_serve(bind.as_deref()).await,
            Commands::Classify { payload, pretty } => self.execute_classify(payload, *pretty).await,
        }
    }
}
