use crate::error::{Error, Result};
use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

pub const CPU_THREADS_ENV: &str = "MVS_CPU_THREADS";

static THREAD_POOL_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize the global Rayon thread pool used by CPU-parallel routines.
///
/// Priority:
/// 1. `num_threads` argument
/// 2. `MVS_CPU_THREADS` environment variable
/// 3. Rayon default
///
/// Repeated calls return the result of the first one.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<()> {
    THREAD_POOL_INIT
        .get_or_init(|| {
            let configured_threads = match num_threads {
                Some(n) => Some(n),
                None => read_cpu_threads_from_env()?,
            };

            let mut builder = ThreadPoolBuilder::new();
            if let Some(n) = configured_threads {
                if n == 0 {
                    return Err(format!("{CPU_THREADS_ENV} must be >= 1"));
                }
                builder = builder.num_threads(n);
            }

            builder.build_global().map_err(|e| e.to_string())
        })
        .clone()
        .map_err(Error::ThreadPool)
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

/// Runs `op` inside a dedicated pool of `num_threads` workers, or on the
/// current pool when `None`.
pub fn with_thread_count<R, F>(num_threads: Option<usize>, op: F) -> Result<R>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match num_threads {
        None => Ok(op()),
        Some(n) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| Error::ThreadPool(e.to_string()))?;
            Ok(pool.install(op))
        }
    }
}

fn read_cpu_threads_from_env() -> std::result::Result<Option<usize>, String> {
    match env::var(CPU_THREADS_ENV) {
        Ok(raw) => parse_cpu_threads(&raw).map(Some),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(format!("failed to read {CPU_THREADS_ENV}: {e}")),
    }
}

/// Worker count given as `MVS_CPU_THREADS`; surrounding whitespace is ignored.
fn parse_cpu_threads(raw: &str) -> std::result::Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(format!("{CPU_THREADS_ENV} must be >= 1")),
        Ok(n) => Ok(n),
        Err(_) => Err(format!(
            "{CPU_THREADS_ENV} must be a positive integer, got '{raw}'"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_thread_count() {
        let n = with_thread_count(Some(3), current_cpu_threads).unwrap();
        assert_eq!(n, 3);
        let m = with_thread_count(None, || 7).unwrap();
        assert_eq!(m, 7);
    }

    #[test]
    fn test_parse_cpu_threads() {
        assert_eq!(parse_cpu_threads("4"), Ok(4));
        assert_eq!(parse_cpu_threads(" 12\n"), Ok(12));
        assert!(parse_cpu_threads("0").unwrap_err().contains(">= 1"));
        assert!(parse_cpu_threads("four").unwrap_err().contains("positive integer"));
        assert!(parse_cpu_threads("-2").is_err());
        assert!(parse_cpu_threads("").is_err());
    }

    #[test]
    fn test_read_cpu_threads_from_env() {
        // Only this test touches the variable.
        env::set_var(CPU_THREADS_ENV, "3");
        assert_eq!(read_cpu_threads_from_env(), Ok(Some(3)));
        env::set_var(CPU_THREADS_ENV, "0");
        assert!(read_cpu_threads_from_env().is_err());
        env::set_var(CPU_THREADS_ENV, "many");
        assert!(read_cpu_threads_from_env().is_err());
        env::remove_var(CPU_THREADS_ENV);
        assert_eq!(read_cpu_threads_from_env(), Ok(None));
    }

    #[test]
    fn test_init_global_thread_pool_is_idempotent() {
        let first = init_global_thread_pool(Some(2));
        let second = init_global_thread_pool(Some(5));
        assert_eq!(first.is_ok(), second.is_ok());
        if let (Err(Error::ThreadPool(a)), Err(Error::ThreadPool(b))) = (&first, &second) {
            assert_eq!(a, b);
        }
    }
}
