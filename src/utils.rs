use tracing::{debug, error};

/// Resolves on SIGTERM or SIGINT (Ctrl-C elsewhere).
pub async fn shutdown_signal() {
    let name = wait_for_stop_signal().await;
    debug!("Received signal: {}", name);
}

#[cfg(unix)]
async fn wait_for_stop_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut terminate, mut interrupt) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(terminate), Ok(interrupt)) => (terminate, interrupt),
        _ => {
            error!("unix signal handlers unavailable, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return "CTRL_C";
        }
    };
    tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "CTRL_C"
}

/// Reads `path`, else `<name>.toml`, else `/etc/sermoncast/<name>.toml`. An unreadable file
/// means defaults; a file that does not parse is an error.
pub fn load<T>(name: &str, path: Option<String>) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned + std::default::Default,
{
    use std::fs::read_to_string;
    let content = match path {
        Some(path) => read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("config {} unreadable: {}", path, e))?,
        None => read_to_string(format!("{name}.toml"))
            .or(read_to_string(format!("/etc/sermoncast/{name}.toml")))
            .unwrap_or_default(),
    };
    if content.trim().is_empty() {
        return Ok(Default::default());
    }
    toml::from_str(&content).map_err(|e| anyhow::anyhow!("config {} parse error: {}", name, e))
}
