use std::time::Duration;

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // address and port that the app will bind to
    #[clap(long, env, default_value = "0.0.0.0")]
    pub host: String,

    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // budget for upstream response headers, and for playlist bodies which get buffered
    #[clap(long, env, default_value = "30")]
    pub upstream_timeout_secs: u64,

    // longest silence allowed between two reads, the only limit on streamed media bodies
    #[clap(long, env, default_value = "15")]
    pub upstream_read_timeout_secs: u64,

    #[clap(long, env, default_value = "10")]
    pub upstream_connect_timeout_secs: u64,

    #[clap(long, env, default_value = "10")]
    pub max_redirects: usize,

    // some origins sniff this so it looks like a regular desktop browser
    #[clap(long, env, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    // if the relay sits behind another host (cdn, tunnel) put its public url here like
    // https://relay.example.com and rewritten playlists will carry absolute links to it.
    // without it playlists get origin relative links like /api/stream-proxy?url=...
    #[clap(long, env)]
    pub public_base_url: Option<String>,

    // live playlists change every few seconds so don't let anything hold on to them
    #[clap(long, env, default_value = "no-cache")]
    pub playlist_cache_control: String,

    #[clap(long, env, default_value = "max-age=3600")]
    pub media_cache_control: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn upstream_read_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_read_timeout_secs)
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_secs)
    }
}

impl Default for AppConfig {
    // mostly here for tests, the real values come from env or flags
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            host: "0.0.0.0".to_string(),
            port: 5000,
            upstream_timeout_secs: 30,
            upstream_read_timeout_secs: 15,
            upstream_connect_timeout_secs: 10,
            max_redirects: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            public_base_url: None,
            playlist_cache_control: "no-cache".to_string(),
            media_cache_control: "max-age=3600".to_string(),
            sentry_dsn: None,
        }
    }
}
