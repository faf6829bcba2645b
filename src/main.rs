use timetable_solver::{server, solver};

const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // HiGHS keeps one thread pool per process; per-request worker counts cannot resize it
    match std::env::var("TIMETABLE_WORKERS").map(|v| v.parse::<u32>()) {
        Ok(Ok(workers)) => {
            let threads = solver::solver_threads(workers);
            log::info!("HiGHS runs with {} thread(s)", threads);
        }
        Ok(Err(e)) => log::warn!("Ignoring TIMETABLE_WORKERS: {}", e),
        Err(_) => {}
    }

    let addr = std::env::var("TIMETABLE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    if let Err(e) = server::run_server(&addr).await {
        log::error!("Server on {} stopped: {}", addr, e);
        std::process::exit(1);
    }
}
