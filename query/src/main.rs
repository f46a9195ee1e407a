use std::process;

#[tokio::main]
async fn main() {
    common::logging::init();
    let env = common::config::capture_env();

    let code = query::cli::execute(std::env::args_os(), &env, |settings| async move {
        query::connect_athena(&settings).await
    })
    .await;

    process::exit(code);
}
