#[tokio::main]
async fn main() -> anyhow::Result<()> {
    apkg_inspect::run().await
}
