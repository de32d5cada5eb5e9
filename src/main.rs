// kiln command line entry point

use kiln::cli::CliHandler;

#[tokio::main]
async fn main() {
    let handler = CliHandler::new();

    if let Err(e) = handler.run().await {
        eprintln!("❌ Error: {}", e.format_detailed());
        std::process::exit(1);
    }
}
