use crate::error::{Error, Result};
use std::env;

/// Where this process sits in a Slurm job: rank `rank` of `ntasks`, with
/// `rank < ntasks` guaranteed by construction.
#[derive(Debug, Clone)]
pub struct SlurmEnv {
    pub job_id: String,
    pub ntasks: usize,
    pub rank: usize,
}

impl SlurmEnv {
    /// `None` outside a Slurm job. Inside one, a topology this process cannot take
    /// its share of is a `Config` error.
    pub fn detect() -> Result<Option<Self>> {
        let Ok(job_id) = env::var("SLURM_JOB_ID") else {
            return Ok(None);
        };
        let ntasks = env::var("SLURM_NTASKS").ok();
        let procid = env::var("SLURM_PROCID").ok();
        Self::from_vars(job_id, ntasks.as_deref(), procid.as_deref()).map(Some)
    }

    /// A missing task count means a single task, a missing proc id means rank 0.
    pub fn from_vars(job_id: String, ntasks: Option<&str>, procid: Option<&str>) -> Result<Self> {
        let ntasks = match ntasks {
            Some(v) => parse_var("SLURM_NTASKS", v)?,
            None => 1,
        };
        if ntasks == 0 {
            return Err(Error::Config("SLURM_NTASKS is 0".into()));
        }
        let rank = match procid {
            Some(v) => parse_var("SLURM_PROCID", v)?,
            None => 0,
        };
        if rank >= ntasks {
            return Err(Error::Config(format!("SLURM_PROCID {} is outside of {} tasks", rank, ntasks)));
        }
        Ok(Self { job_id, ntasks, rank })
    }

    /// A single rank 0, for runs outside Slurm.
    pub fn local(job_id: String) -> Self {
        Self { job_id, ntasks: 1, rank: 0 }
    }

    pub fn is_slurm() -> bool { env::var("SLURM_JOB_ID").is_ok() }

    /// Rank 0 coordinates the reduction and writes the report.
    pub fn is_coordinator(&self) -> bool { self.rank == 0 }
}

fn parse_var(name: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} is not a task number: '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_single_rank_zero() {
        let env = SlurmEnv::from_vars("42".into(), None, None).unwrap();
        assert_eq!((env.ntasks, env.rank), (1, 0));
        assert!(env.is_coordinator());
    }

    #[test]
    fn reads_rank_within_tasks() {
        let env = SlurmEnv::from_vars("42".into(), Some("8"), Some("7")).unwrap();
        assert_eq!((env.ntasks, env.rank), (8, 7));
        assert!(!env.is_coordinator());
    }

    #[test]
    fn rejects_rank_outside_tasks() {
        assert!(matches!(SlurmEnv::from_vars("42".into(), Some("4"), Some("4")), Err(Error::Config(_))));
        assert!(matches!(SlurmEnv::from_vars("42".into(), None, Some("1")), Err(Error::Config(_))));
        assert!(matches!(SlurmEnv::from_vars("42".into(), Some("0"), None), Err(Error::Config(_))));
        assert!(matches!(SlurmEnv::from_vars("42".into(), Some("4(x2)"), None), Err(Error::Config(_))));
        assert!(matches!(SlurmEnv::from_vars("42".into(), Some("4"), Some("-1")), Err(Error::Config(_))));
    }
}
