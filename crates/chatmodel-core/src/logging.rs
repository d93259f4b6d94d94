use crate::Result;

/// Initialize tracing for the middleware.
///
/// Default: info for our crates, warn for everything else. Can be overridden
/// with `RUST_LOG`.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,chatmodel=info,chatmodel_core=info,chatmodel_openai=info,\
             chatmodel_anthropic=info,chatmodel_gemini=info,chatmodel_telegram=info,\
             {service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| crate::Error::Config(format!("failed to install log subscriber: {e}")))?;

    Ok(())
}
