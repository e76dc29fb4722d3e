#[tokio::main]
async fn main() {
    let exit_code = suitec_data_sync::cli::push_main().await;
    std::process::exit(exit_code);
}
