use crate::error::Result;
use crate::slurm::SlurmEnv;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Slurm topology when running under a job, otherwise a single local rank.
pub fn detect_env_or_local() -> Result<SlurmEnv> {
    if let Some(env) = SlurmEnv::detect()? {
        return Ok(env);
    }
    let pid = std::process::id();
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(SlurmEnv::local(format!("local-{}-{}", pid, ts)))
}

pub fn env_var_truthy(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.to_ascii_lowercase();
            v == "1" || v == "true" || v == "yes" || v == "on"
        }
        Err(_) => false,
    }
}

/// Parsed value of `name`, or `None` when unset or unparsable.
pub fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Pin rayon's global pool size unless the user already did.
pub fn configure_rayon_threads(override_var: &str) {
    if std::env::var("RAYON_NUM_THREADS").is_err() {
        let n = env_parse::<usize>(override_var).or_else(|| env_parse::<usize>("SLURM_CPUS_PER_TASK"));
        if let Some(n) = n {
            if n > 0 {
                std::env::set_var("RAYON_NUM_THREADS", n.to_string());
            }
        }
    }
}
