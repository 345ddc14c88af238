use anyhow::Result;

mod api;
mod app;
mod config;
mod error;
mod middleware;
mod repos;
mod services;
mod state;
#[cfg(test)]
mod test_utils;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
