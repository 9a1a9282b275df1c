#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quizdeck_backend::run().await
}
