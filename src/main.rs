use bratz_server::config::Config;
use bratz_server::database::AppState;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env();
    let addr = config.bind_addr();

    let app_state = AppState::connect(config).await;
    let app = bratz_server::build_app(app_state);

    log::info!("Starting http server at {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("bind http listener");
    axum::serve(listener, app.into_make_service())
        .await
        .expect("run http server");
}
