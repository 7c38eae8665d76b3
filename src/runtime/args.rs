#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeArgs {
    pub force_refresh: bool,
    pub cache_only: bool,
    pub explain_config: bool,
}

fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str) -> anyhow::Result<bool> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_bool_flag(&raw).ok_or_else(|| {
            anyhow::anyhow!("invalid {}='{}' (expected true/false, 1/0, yes/no, on/off)", name, raw.trim())
        }),
        _ => Ok(false),
    }
}

fn parse_runtime_args_from_iter<I, S>(args: I) -> anyhow::Result<RuntimeArgs>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let supplied_args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_string())
        .collect::<Vec<_>>();
    if !supplied_args.is_empty() {
        let joined = supplied_args.join(" ");
        return Err(anyhow::anyhow!(
            "CLI arguments are not accepted. Configure through the environment instead (LABELS_FORCE_REFRESH, LABELS_CACHE_ONLY, LABELS_EXPLAIN_CONFIG). Received args: {}",
            joined
        ));
    }

    let parsed = RuntimeArgs {
        force_refresh: env_flag("LABELS_FORCE_REFRESH")?,
        cache_only: env_flag("LABELS_CACHE_ONLY")?,
        explain_config: env_flag("LABELS_EXPLAIN_CONFIG")?,
    };
    if parsed.force_refresh && parsed.cache_only {
        return Err(anyhow::anyhow!(
            "LABELS_FORCE_REFRESH and LABELS_CACHE_ONLY cannot both be set"
        ));
    }
    Ok(parsed)
}

pub fn parse_runtime_args() -> anyhow::Result<RuntimeArgs> {
    parse_runtime_args_from_iter(std::env::args().skip(1))
}
