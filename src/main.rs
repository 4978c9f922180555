#[tokio::main]
async fn main() {
    if let Err(e) = veridex::run().await {
        eprintln!("veridex failed to start: {e}");
        std::process::exit(1);
    }
}
