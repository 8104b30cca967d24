#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    transfer_validator_node::run::run().await
}
