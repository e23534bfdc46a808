#[tokio::main]
async fn main() {
    survivor_pool_lib::run().await;
}
