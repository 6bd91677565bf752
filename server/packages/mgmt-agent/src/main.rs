fn main() {
    if let Err(err) = mgmt_agent::cli::run_mgmt_agent() {
        tracing::error!(error = %err, "mgmt-agent failed");
        std::process::exit(1);
    }
}
