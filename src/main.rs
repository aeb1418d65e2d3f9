#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = cbt_engine::run().await {
        eprintln!("cbt-engine fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
