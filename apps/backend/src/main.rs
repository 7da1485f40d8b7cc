#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gramoteka_backend::run().await
}
