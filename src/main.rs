use clap::Parser;
use crust::{Config, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Server::new(Config::parse()).start().await
}
