use etl::EtlPipeline;
use std::process;

#[tokio::main]
async fn main() {
    common::logging::init();
    let env = common::config::capture_env();

    let code = etl::cli::execute(std::env::args_os(), &env, |settings| async move {
        EtlPipeline::from_settings(&settings).await
    })
    .await;

    process::exit(code);
}
