use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::unbounded;

use crate::api;
use crate::config;
use crate::data::{ApiCommentService, ApiFeedService, ApiInteractionService};
use crate::feed::{Feed, FeedServices};
use crate::logging;
use crate::model::FeedType;
use crate::session::Session;
use crate::ui;
use crate::video::{MpvBackend, MpvOptions};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub feed_type: Option<FeedType>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_path.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let config_path = options.config_path.or_else(config::default_path);
    let display_path = friendly_path(config_path.as_deref());

    if let Err(err) = logging::init_logging(&logging::default_log_dir()) {
        eprintln!("warning: logging disabled: {err:#}");
    }

    let token = Some(cfg.api.token.trim().to_string()).filter(|token| !token.is_empty());
    let session = Arc::new(Session::new(token));
    let client = Arc::new(
        api::Client::new(
            session.clone(),
            api::ClientConfig {
                user_agent: cfg.api.user_agent.clone(),
                base_url: Some(cfg.api.base_url.clone()),
                timeout: cfg.api.timeout,
                http_client: None,
            },
        )
        .context("create api client")?,
    );

    let services = FeedServices {
        feed: Arc::new(ApiFeedService::new(client.clone())),
        comments: Arc::new(ApiCommentService::new(client.clone())),
        interactions: Arc::new(ApiInteractionService::new(client)),
    };

    let (media_tx, media_rx) = unbounded();
    let backend = MpvBackend::new(
        MpvOptions {
            mpv_path: cfg.playback.mpv_path.clone(),
            user_agent: cfg.api.user_agent.clone(),
        },
        media_tx,
    );

    let feed = Feed::new(services, Box::new(backend), media_rx, cfg.feed_options());
    let initial_feed = options.feed_type.unwrap_or(cfg.feed.default_type);
    tracing::info!(
        feed = initial_feed.as_str(),
        base_url = %cfg.api.base_url,
        logged_in = session.is_logged_in(),
        "starting"
    );

    let mut model = ui::Model::new(ui::Options {
        feed,
        session,
        initial_feed,
        config_path: display_path,
    });
    model.run()
}

fn friendly_path(path: Option<&Path>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "(no config directory)".to_string()
    }
}
