use echo_server::{parse_port_arg, server, stdout_logging};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() {
    stdout_logging();
    let port = parse_port_arg();
    let listener = match server::bind(port).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Unable to listen on 0.0.0.0:{port}: {err}");
            std::process::exit(1)
        }
    };
    if let Err(err) = server::serve(listener).await {
        tracing::error!("Accept loop stopped: {err}");
        std::process::exit(1)
    }
}
