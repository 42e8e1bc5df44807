use sentinel_httpd::config::Config;
use sentinel_httpd::server;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    server::run(&cfg)
}
